use super::MessageRecord;
use chrono::NaiveDate;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const FILE_PREFIX: &str = "mqtt_data";
const FILE_EXTENSION: &str = "jsonl";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Corrupt record at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Daily JSONL files under one data root.
#[derive(Debug, Clone)]
pub struct MessageArchive {
    root: PathBuf,
}

impl MessageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn daily_file(&self, serial: &str, date: NaiveDate) -> PathBuf {
        self.root.join(format!(
            "{}_{}_{}.{}",
            FILE_PREFIX,
            serial,
            date.format("%Y-%m-%d"),
            FILE_EXTENSION
        ))
    }

    /// Appends one line to the record's daily file and returns that file's path.
    ///
    /// The day is taken from the record's own timestamp, so a message received
    /// just before midnight lands in the file of the day it arrived.
    pub async fn append(&self, record: &MessageRecord) -> Result<PathBuf, ArchiveError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| ArchiveError::Io {
                path: self.root.clone(),
                source,
            })?;

        let path = self.daily_file(&record.serial, record.timestamp.date_naive());
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let io_err = |source: std::io::Error| ArchiveError::Io {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        // single write keeps the line intact
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        debug!("Data saved to {}", path.display());
        Ok(path)
    }

    /// Reads a day back in arrival order. A day without a file is empty.
    pub async fn read_day(
        &self,
        serial: &str,
        date: NaiveDate,
    ) -> Result<Vec<MessageRecord>, ArchiveError> {
        let path = self.daily_file(serial, date);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ArchiveError::Io { path, source }),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|source| ArchiveError::Corrupt {
                    path: path.clone(),
                    line: idx + 1,
                    source,
                })
            })
            .collect()
    }
}

//! Per-message work: archive first, then decode into the status snapshot.

use crate::mqtt::message::InboundMessage;
use crate::persistence::{MessageArchive, MessageRecord};
use crate::status::{DecodeError, DeviceStatus, StatusUpdate};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Notified with the snapshot after every successfully decoded report.
pub type StatusCallback = Arc<dyn Fn(&DeviceStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyPayload,
    InvalidUtf8,
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Nothing was archived or decoded.
    Skipped(SkipReason),
    /// Archived (or tried to), but no status section could be decoded.
    Archived,
    /// Decoded and merged; carries the snapshot after the merge.
    Decoded(DeviceStatus),
}

pub struct IngestPipeline {
    serial: String,
    archive: MessageArchive,
    status: Arc<watch::Sender<DeviceStatus>>,
    callback: Option<StatusCallback>,
}

impl IngestPipeline {
    pub fn new(
        serial: impl Into<String>,
        archive: MessageArchive,
        status: Arc<watch::Sender<DeviceStatus>>,
    ) -> Self {
        Self {
            serial: serial.into(),
            archive,
            status,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Option<StatusCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub async fn ingest(&self, message: InboundMessage) -> IngestOutcome {
        if message.payload.is_empty() {
            debug!("Empty payload on {}, skipping", message.topic);
            return IngestOutcome::Skipped(SkipReason::EmptyPayload);
        }

        let InboundMessage {
            topic,
            payload,
            received_at,
        } = message;
        let text = match String::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to decode message on {}: {}", topic, e);
                return IngestOutcome::Skipped(SkipReason::InvalidUtf8);
            }
        };
        debug!(topic = %topic, bytes = text.len(), "Received message");

        let record = MessageRecord::new(received_at, topic, text, self.serial.as_str());
        if let Err(e) = self.archive.append(&record).await {
            error!("Error saving data: {}", e);
        }

        let update = match StatusUpdate::from_payload(&record.payload) {
            Ok(update) => update,
            Err(DecodeError::MissingSection(section)) => {
                debug!("Report without `{}` section, snapshot unchanged", section);
                return IngestOutcome::Archived;
            }
            Err(e) => {
                warn!("Failed to parse JSON message: {}", e);
                return IngestOutcome::Archived;
            }
        };

        if update.is_empty() {
            debug!("Status section carries no recognized fields");
        }

        let mut snapshot = DeviceStatus::default();
        self.status.send_modify(|status| {
            let applied = status.apply(&update);
            debug!("Applied {} status field(s)", applied);
            snapshot = status.clone();
        });
        debug!(
            "Status: nozzle {:.1}°C, bed {:.1}°C, wifi {}",
            snapshot.nozzle_temper, snapshot.bed_temper, snapshot.wifi_signal
        );

        if let Some(callback) = &self.callback {
            callback(&snapshot);
        }
        IngestOutcome::Decoded(snapshot)
    }
}

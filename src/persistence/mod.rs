//! # Persistence Module
//!
//! Durable, append-only storage of every report received from the printer.
//!
//! Records are newline-delimited JSON grouped into one file per serial and
//! local calendar day:
//!
//! ```text
//! {data_root}/mqtt_data_{serial}_{YYYY-MM-DD}.jsonl
//! ```
//!
//! Each line is a [`MessageRecord`]. Nothing in this crate rewrites or
//! deletes those files; rotation and retention are left to the operator.

pub mod archive;

pub use archive::{ArchiveError, MessageArchive};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One archived report, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Arrival time at the transport, local clock.
    pub timestamp: DateTime<Local>,
    pub topic: String,
    /// Raw payload text; not re-encoded or pretty-printed.
    pub payload: String,
    pub serial: String,
}

impl MessageRecord {
    pub fn new(
        timestamp: DateTime<Local>,
        topic: impl Into<String>,
        payload: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            topic: topic.into(),
            payload: payload.into(),
            serial: serial.into(),
        }
    }
}

//! Device status snapshot and the decoder for `print` report sections.
//!
//! Reports look like this (abridged):
//!
//! ```json
//! {
//!     "print": {
//!         "nozzle_temper": 26.78125,
//!         "bed_temper": 27.65625,
//!         "wifi_signal": "-29dBm",
//!         "command": "push_status",
//!         "msg": 1,
//!         "sequence_id": "2511"
//!     }
//! }
//! ```
//!
//! Printers send delta reports most of the time, so decoding yields a
//! [`StatusUpdate`] of optional fields which is then merged field by field
//! into the [`DeviceStatus`]. Fields missing from a report keep their
//! previous value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the nested status object inside a report.
pub const STATUS_SECTION: &str = "print";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload root is not a JSON object")]
    NotAnObject,

    #[error("Payload has no `{0}` status object")]
    MissingSection(&'static str),
}

/// Last known printer status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub nozzle_temper: f64,
    pub bed_temper: f64,
    pub wifi_signal: String,
    pub command: String,
    pub msg: i64,
    pub sequence_id: String,
}

impl DeviceStatus {
    /// Merges every field present in `update`, returns how many were applied.
    pub fn apply(&mut self, update: &StatusUpdate) -> usize {
        let mut applied = 0;
        if let Some(value) = update.nozzle_temper {
            self.nozzle_temper = value;
            applied += 1;
        }
        if let Some(value) = update.bed_temper {
            self.bed_temper = value;
            applied += 1;
        }
        if let Some(value) = &update.wifi_signal {
            self.wifi_signal.clone_from(value);
            applied += 1;
        }
        if let Some(value) = &update.command {
            self.command.clone_from(value);
            applied += 1;
        }
        if let Some(value) = update.msg {
            self.msg = value;
            applied += 1;
        }
        if let Some(value) = &update.sequence_id {
            self.sequence_id.clone_from(value);
            applied += 1;
        }
        applied
    }
}

/// Recognized fields of one report; `None` means absent or unusable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub nozzle_temper: Option<f64>,
    pub bed_temper: Option<f64>,
    pub wifi_signal: Option<String>,
    pub command: Option<String>,
    pub msg: Option<i64>,
    pub sequence_id: Option<String>,
}

impl StatusUpdate {
    pub fn from_payload(payload: &str) -> Result<Self, DecodeError> {
        let root: Value = serde_json::from_str(payload)?;
        let root = root.as_object().ok_or(DecodeError::NotAnObject)?;
        let section = root
            .get(STATUS_SECTION)
            .and_then(Value::as_object)
            .ok_or(DecodeError::MissingSection(STATUS_SECTION))?;
        Ok(Self::from_section(section))
    }

    fn from_section(section: &Map<String, Value>) -> Self {
        Self {
            nozzle_temper: section.get("nozzle_temper").and_then(as_number),
            bed_temper: section.get("bed_temper").and_then(as_number),
            wifi_signal: section.get("wifi_signal").and_then(as_text),
            command: section.get("command").and_then(as_text),
            msg: section.get("msg").and_then(as_integer),
            sequence_id: section.get("sequence_id").and_then(as_text),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

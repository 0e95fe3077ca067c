use chrono::{DateTime, Local};
use std::fmt;

const PREVIEW_CHARS: usize = 48;

/// A PUBLISH received from the printer, stamped on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.payload);
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if text.chars().count() > PREVIEW_CHARS { "..." } else { "" };
        write!(
            f,
            "{} - {} ({} bytes) {}{}",
            self.received_at.format("%H:%M:%S%.3f"),
            self.topic,
            self.payload.len(),
            preview,
            ellipsis
        )
    }
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::received_at(topic, payload, Local::now())
    }

    pub fn received_at(
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        received_at: DateTime<Local>,
    ) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            received_at,
        }
    }
}

use super::message::InboundMessage;
use super::session::SessionEvent;

/// Everything the transport reports to the session driver.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// CONNACK with return code 0.
    Connected,
    /// The initial connect did not complete: refused, TLS failure, timeout.
    ConnectFailed { reason: String },
    /// An established session ended without the caller asking for it.
    Disconnected { reason: String },
    /// SUBACK; `granted` is false if the broker returned a failure code.
    Subscribed { pkid: u16, granted: bool },
    Message(InboundMessage),
}

impl TransportEvent {
    /// The lifecycle event this maps to, if any.
    pub fn session_event(&self) -> Option<SessionEvent> {
        match self {
            TransportEvent::Connected => Some(SessionEvent::TransportConnected),
            TransportEvent::ConnectFailed { .. } => Some(SessionEvent::TransportFailed),
            TransportEvent::Disconnected { .. } => Some(SessionEvent::TransportDisconnected),
            TransportEvent::Subscribed { .. } | TransportEvent::Message(_) => None,
        }
    }
}

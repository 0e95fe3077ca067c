//! # MQTT Module
//!
//! Everything that touches the printer's broker.
//!
//! ```text
//! mqtt/
//! ├── config.rs     - Port, credentials and timing defaults
//! ├── tls.rs        - rustls setup that accepts the printer's self-signed cert
//! ├── transport.rs  - Builds the link and pumps rumqttc's event loop
//! ├── events.rs     - What the pump reports back
//! ├── message.rs    - Inbound PUBLISH with its arrival time
//! └── session.rs    - Connection state machine and the task driving it
//! ```
//!
//! The pump and the session driver run as separate tasks joined by an mpsc
//! channel of [`events::TransportEvent`]s. Only the driver writes session
//! state.

pub mod config;
pub mod events;
pub mod message;
pub mod session;
pub mod tls;
pub mod transport;

//! LAN client for a single 3D printer speaking MQTT over TLS.
//!
//! [`PrinterClient`] connects to the printer's broker, subscribes to its
//! report topic, archives every report as JSON lines and keeps a
//! [`DeviceStatus`] snapshot current. Commands from [`commands`] go out
//! through [`PrinterClient::publish`].

pub mod client;
pub mod commands;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod mqtt;
pub mod persistence;
pub mod status;

pub use client::PrinterClient;
pub use config::{ClientConfig, ConfigError, ConnectionIdentity};
pub use ingest::{IngestOutcome, StatusCallback};
pub use logging::LogSink;
pub use mqtt::session::SessionState;
pub use persistence::{MessageArchive, MessageRecord};
pub use status::DeviceStatus;

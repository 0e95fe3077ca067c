use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Secure MQTT port the printers listen on.
pub const DEFAULT_PORT: u16 = 8883;
/// Fixed service account used for LAN access.
pub const DEFAULT_USER: &str = "bblp";

/// Transport settings for the printer link.
///
/// Everything here has a working default; only the printer identity in
/// [`crate::config::ConnectionIdentity`] has to be supplied.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    pub port: u16,
    pub username: String,
    /// Seconds between PINGREQs once connected.
    pub keep_alive_secs: u64,
    /// Upper bound for TCP connect + TLS handshake + CONNACK.
    pub connect_timeout_secs: u64,
    /// Overrides the generated `printlink-{serial}` client id.
    pub client_id: Option<String>,
    /// Capacity of the request queue and of the internal event channel.
    pub channel_capacity: usize,
    /// Full `pushall` reports are far bigger than rumqttc's 10 KiB default.
    pub max_packet_size: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            username: DEFAULT_USER.to_string(),
            keep_alive_secs: 120,
            connect_timeout_secs: 60,
            client_id: None,
            channel_capacity: 100,
            max_packet_size: 1024 * 1024,
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn client_id_for(&self, serial: &str) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("printlink-{}", serial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_printer_lan_mode() {
        let config = MqttConfig::default();
        assert_eq!(config.port, 8883);
        assert_eq!(config.username, "bblp");
        assert_eq!(config.keep_alive(), Duration::from_secs(120));
        assert_eq!(config.connect_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn client_id_falls_back_to_serial() {
        let mut config = MqttConfig::default();
        assert_eq!(config.client_id_for("01S00A"), "printlink-01S00A");

        config.client_id = Some("bench".to_string());
        assert_eq!(config.client_id_for("01S00A"), "bench");
    }
}

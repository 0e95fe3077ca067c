//! Client configuration loaded from TOML.
//!
//! A config file needs only the `[printer]` section; every other section
//! falls back to defaults that match the printer's LAN mode.
//!
//! ```toml
//! [printer]
//! host = "192.168.1.199"
//! access_code = "12345678"
//! serial = "01S00A000000000"
//!
//! [storage]
//! data_root = "/var/lib/printlink"
//! ```

use crate::mqtt::config::MqttConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

const CONFIG_DIR: &str = ".config/printlink";
const CONFIG_FILE: &str = "config.toml";

const TOPIC_BASE: &str = "device";
const TOPIC_REPORT: &str = "report";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown log level: {0}")]
    LogLevel(String),
}

/// Who we talk to: printer address, LAN access code and serial.
///
/// The access code is the MQTT password, so `Debug` never prints it.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub host: String,
    pub access_code: String,
    pub serial: String,
}

impl fmt::Debug for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionIdentity")
            .field("host", &self.host)
            .field("access_code", &"<redacted>")
            .field("serial", &self.serial)
            .finish()
    }
}

impl ConnectionIdentity {
    pub fn new(
        host: impl Into<String>,
        access_code: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            access_code: access_code.into(),
            serial: serial.into(),
        }
    }

    /// `device/{serial}/report`, used for both subscribe and publish.
    pub fn report_topic(&self) -> String {
        format!("{}/{}/{}", TOPIC_BASE, self.serial, TOPIC_REPORT)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the daily `.jsonl` message files.
    pub data_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("mqtt_data"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.level).map_err(|_| ConfigError::LogLevel(self.level.clone()))
    }
}

/// Settings for the bundled `printlink` binary only.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    pub pushall_interval_secs: u64,
    pub connect_wait_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pushall_interval_secs: 5,
            connect_wait_secs: 60,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub printer: ConnectionIdentity,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl ClientConfig {
    pub fn new(printer: ConnectionIdentity) -> Self {
        Self {
            printer,
            mqtt: MqttConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            runner: RunnerConfig::default(),
        }
    }

    pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
        self.storage.data_root = data_root.into();
        self
    }

    /// `~/.config/printlink/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        debug!("Parsed configuration: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let printer = &self.printer;
        if printer.host.trim().is_empty() {
            return Err(ConfigError::Invalid("printer.host is empty".into()));
        }
        if printer.serial.trim().is_empty() {
            return Err(ConfigError::Invalid("printer.serial is empty".into()));
        }
        if printer.access_code.is_empty() {
            return Err(ConfigError::Invalid("printer.access_code is empty".into()));
        }
        // rumqttc refuses keep-alive intervals below 5 seconds
        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::Invalid(format!(
                "mqtt.keep_alive_secs must be at least 5, got {}",
                self.mqtt.keep_alive_secs
            )));
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.connect_timeout_secs must be positive".into(),
            ));
        }
        if self.mqtt.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.channel_capacity must be positive".into(),
            ));
        }
        self.logging.max_level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [printer]
        host = "192.168.1.199"
        access_code = "56154859"
        serial = "03919D530105226"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.printer.host, "192.168.1.199");
        assert_eq!(config.mqtt, MqttConfig::default());
        assert_eq!(config.storage.data_root, PathBuf::from("mqtt_data"));
        assert_eq!(config.logging.max_level().unwrap(), tracing::Level::INFO);
        assert_eq!(config.runner.pushall_interval_secs, 5);
    }

    #[test]
    fn sections_override_defaults() {
        let content = format!(
            "{}\n[mqtt]\nkeep_alive_secs = 30\n\n[storage]\ndata_root = \"/tmp/reports\"\n\n[logging]\nlevel = \"debug\"\n",
            MINIMAL
        );
        let config = ClientConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.mqtt.keep_alive_secs, 30);
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.storage.data_root, PathBuf::from("/tmp/reports"));
        assert_eq!(config.logging.max_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn missing_printer_section_is_a_parse_error() {
        let err = ClientConfig::from_toml_str("[mqtt]\nport = 8883\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ClientConfig::new(ConnectionIdentity::new("10.0.0.2", "code", ""));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.printer.serial = "SERIAL".into();
        config.mqtt.keep_alive_secs = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.mqtt.keep_alive_secs = 120;
        config.logging.level = "loud".into();
        assert!(matches!(config.validate(), Err(ConfigError::LogLevel(_))));

        config.logging.level = "warn".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn report_topic_embeds_serial() {
        let identity = ConnectionIdentity::new("10.0.0.2", "code", "03919D530105226");
        assert_eq!(identity.report_topic(), "device/03919D530105226/report");
    }

    #[test]
    fn debug_output_hides_access_code() {
        let identity = ConnectionIdentity::new("10.0.0.2", "56154859", "SERIAL");
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains("56154859"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ClientConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

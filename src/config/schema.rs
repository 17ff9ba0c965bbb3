//! Configuration schema definitions.
//!
//! Every section derives `Default` and is marked `#[serde(default)]`, so a
//! file only needs the keys it wants to change.

use super::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port configuration
    pub serial: SerialConfig,
    /// Transmit-mode payload
    pub transmit: TransmitConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the session cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud == 0 {
            return Err(ConfigError::validation("serial.baud", "must be positive"));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "serial.poll_interval_ms",
                "must be positive",
            ));
        }
        if self.serial.read_timeout_ms == Some(0) {
            return Err(ConfigError::validation(
                "serial.read_timeout_ms",
                "must be positive; omit it to block indefinitely",
            ));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port to open when none is given on the command line
    pub port: Option<String>,
    /// Baud rate
    pub baud: u32,
    /// Give up on a line read after this long; absent means wait forever
    pub read_timeout_ms: Option<u64>,
    /// How often a blocked read checks whether it should stop
    pub poll_interval_ms: u64,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 9600,
            read_timeout_ms: None,
            poll_interval_ms: 100,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Device behind `name` when it is a configured alias. Keys match exactly.
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.port_aliases.get(name).map(String::as_str)
    }
}

/// What the transmit subcommand sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// Written in order, one write per entry, no terminator added
    pub payload: Vec<String>,
    /// Wait for Enter on the console after each write
    pub step_through: bool,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            payload: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            step_through: true,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "rs485_link=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.serial.read_timeout(), None);
        assert_eq!(config.serial.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.transmit.payload, vec!["A", "B", "C"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("bus".to_string(), "COM32".to_string());

        assert_eq!(config.alias("bus"), Some("COM32"));
        assert_eq!(config.alias("BUS"), None);
        assert_eq!(config.alias("COM5"), None);
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            port = "/dev/ttyUSB0"
            baud = 19200
            read_timeout_ms = 2500

            [transmit]
            payload = ["X", "Y"]
            step_through = false

            [logging]
            format = "json"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.baud, 19200);
        assert_eq!(
            config.serial.read_timeout(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.transmit.payload, vec!["X", "Y"]);
        assert!(!config.transmit.step_through);
        assert_eq!(config.logging.format, LogFormat::Json);
        // Unset keys keep their defaults
        assert_eq!(config.serial.poll_interval_ms, 100);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.serial.baud = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref key, .. }) if key == "serial.baud"
        ));

        let mut config = Config::default();
        config.serial.read_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }
}

//! Configuration schema definitions.
//!
//! All sections deserialize with defaults, so a partial file is valid.

use super::error::{ConfigError, ConfigResult};
use crate::port::{Parity, StopBits};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port configuration
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(port) = &self.serial.port {
            if port.trim().is_empty() {
                return Err(ConfigError::validation("serial.port", "must not be blank"));
            }
        }
        self.serial.options.validate()
    }
}

/// Serial port section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: Option<String>,
    #[serde(flatten)]
    pub options: SerialPortOptions,
}

/// Line settings and timeouts for a serial transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialPortOptions {
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    /// Timeout for a single write call, in milliseconds
    pub write_timeout_ms: u64,
    /// Budget for reading one complete response, in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialPortOptions {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: StopBits::One,
            write_timeout_ms: 500,
            read_timeout_ms: 500,
        }
    }
}

impl SerialPortOptions {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject values no port could use.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.baud_rate == 0 {
            return Err(ConfigError::validation(
                "baud_rate",
                "must be a positive number",
            ));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::validation(
                "data_bits",
                format!("{} is outside 5..=8", self.data_bits),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "write_timeout_ms",
                "must be a positive non-zero number",
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "read_timeout_ms",
                "must be a positive non-zero number",
            ));
        }
        Ok(())
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}

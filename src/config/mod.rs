//! Configuration module.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `SERIAL_TRANSPORT_CONFIG` environment variable (explicit path)
//! 2. `./serial-transport.toml` (current directory)
//! 3. `~/.config/serial-transport/serial-transport.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-transport\serial-transport.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Example
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 9600
//! parity = "none"
//! data_bits = 8
//! stop_bits = "one"
//! read_timeout_ms = 500
//! write_timeout_ms = 500
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, SerialPortOptions};

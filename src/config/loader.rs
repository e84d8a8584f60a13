//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_TRANSPORT";

/// Config file name
const CONFIG_FILE_NAME: &str = "serial-transport.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_TRANSPORT_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_TRANSPORT_CONFIG` environment variable (explicit path)
    /// 2. `./serial-transport.toml` (current directory)
    /// 3. `~/.config/serial-transport/serial-transport.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\serial-transport\serial-transport.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values, and the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(config_dir) = get_config_dir() {
        let app_config = config_dir.join("serial-transport").join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn env_var(key: &str) -> Option<(String, String)> {
    let var = format!("{ENV_PREFIX}_{key}");
    std::env::var(&var).ok().map(|val| (var, val))
}

fn parse_env<T: std::str::FromStr>(var: &str, val: &str, message: &str) -> ConfigResult<T> {
    val.parse().map_err(|_| ConfigError::env_parse(var, message))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_TRANSPORT_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_TRANSPORT_SERIAL_PORT=/dev/ttyUSB0`
/// - `SERIAL_TRANSPORT_SERIAL_BAUD_RATE=9600`
/// - `SERIAL_TRANSPORT_LOGGING_LEVEL=debug`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let options = &mut config.serial.options;

    if let Some((_, val)) = env_var("SERIAL_PORT") {
        config.serial.port = Some(val);
    }
    if let Some((var, val)) = env_var("SERIAL_BAUD_RATE") {
        options.baud_rate = parse_env(&var, &val, "Invalid baud rate")?;
    }
    if let Some((var, val)) = env_var("SERIAL_DATA_BITS") {
        options.data_bits = parse_env(&var, &val, "Invalid data bits")?;
    }
    if let Some((var, val)) = env_var("SERIAL_READ_TIMEOUT_MS") {
        options.read_timeout_ms = parse_env(&var, &val, "Invalid timeout")?;
    }
    if let Some((var, val)) = env_var("SERIAL_WRITE_TIMEOUT_MS") {
        options.write_timeout_ms = parse_env(&var, &val, "Invalid timeout")?;
    }

    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some((var, val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => return Err(ConfigError::env_parse(var, "Expected json, pretty or compact")),
        };
    }

    Ok(())
}

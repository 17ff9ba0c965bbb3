//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "RS485_LINK";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE_NAME: &str = "rs485_link.toml";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "RS485_LINK_CONFIG";

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
    /// 1. `RS485_LINK_CONFIG` environment variable (explicit path)
    /// 2. `./rs485_link.toml` (current directory)
    /// 3. `<platform config dir>/rs485_link/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override values from the file.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
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
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Load like [`load`](Self::load) (or from `explicit` when given), but
    /// never fail: an unreadable or invalid file falls back to defaults, and
    /// each environment override that does not parse or validate is skipped
    /// on its own. Everything skipped is returned for the caller to report.
    pub fn load_lenient(explicit: Option<&Path>) -> (Self, Vec<ConfigError>) {
        let mut problems = Vec::new();
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => resolve_config_path(),
        };

        let mut config = match config_path.as_deref() {
            Some(path) if !path.exists() => {
                problems.push(ConfigError::NotFound(path.to_path_buf()));
                Config::default()
            }
            Some(path) => match load_from_file(path).and_then(|c| c.validate().map(|()| c)) {
                Ok(config) => config,
                Err(e) => {
                    problems.push(e);
                    Config::default()
                }
            },
            None => Config::default(),
        };
        problems.extend(apply_valid_env_overrides(&mut config));

        (
            Self {
                config_path,
                config,
            },
            problems,
        )
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Valid environment overrides are applied; the rest are ignored here
    /// and reported by [`load`](Self::load).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        apply_valid_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
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

    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Platform config file location, whether or not it exists.
pub fn get_default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rs485_link").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Applies one environment value to the configuration.
type EnvOverride = fn(&mut Config, String) -> ConfigResult<()>;

/// Recognised overrides, keyed by the suffix after `RS485_LINK_`:
/// - `RS485_LINK_SERIAL_PORT=COM32`
/// - `RS485_LINK_SERIAL_BAUD=9600`
/// - `RS485_LINK_SERIAL_READ_TIMEOUT_MS=5000`
/// - `RS485_LINK_LOG_LEVEL=debug`
/// - `RS485_LINK_LOG_FORMAT=json`
const ENV_OVERRIDES: [(&str, EnvOverride); 5] = [
    ("SERIAL_PORT", set_port),
    ("SERIAL_BAUD", set_baud),
    ("SERIAL_READ_TIMEOUT_MS", set_read_timeout),
    ("LOG_LEVEL", set_log_level),
    ("LOG_FORMAT", set_log_format),
];

fn env_var_name(suffix: &str) -> String {
    format!("{}_{}", ENV_PREFIX, suffix)
}

/// Present overrides, in table order.
fn present_overrides() -> impl Iterator<Item = (String, EnvOverride, String)> {
    ENV_OVERRIDES.into_iter().filter_map(|(suffix, apply)| {
        let var = env_var_name(suffix);
        std::env::var(&var).ok().map(|value| (var, apply, value))
    })
}

/// Apply environment variable overrides, failing on the first bad value.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    for (_, apply, value) in present_overrides() {
        apply(config, value)?;
    }
    Ok(())
}

/// Apply each override that parses and keeps the configuration valid.
///
/// Rejected overrides leave `config` untouched and are returned.
fn apply_valid_env_overrides(config: &mut Config) -> Vec<ConfigError> {
    let mut rejected = Vec::new();
    for (var, apply, value) in present_overrides() {
        let mut candidate = config.clone();
        match apply(&mut candidate, value).and_then(|()| candidate.validate()) {
            Ok(()) => *config = candidate,
            Err(e) => {
                debug!(var = %var, error = %e, "ignoring environment override");
                rejected.push(e);
            }
        }
    }
    rejected
}

fn set_port(config: &mut Config, value: String) -> ConfigResult<()> {
    config.serial.port = Some(value);
    Ok(())
}

fn set_baud(config: &mut Config, value: String) -> ConfigResult<()> {
    config.serial.baud = value
        .parse()
        .map_err(|_| ConfigError::env_parse(env_var_name("SERIAL_BAUD"), "Invalid baud rate"))?;
    Ok(())
}

fn set_read_timeout(config: &mut Config, value: String) -> ConfigResult<()> {
    let millis = value.parse().map_err(|_| {
        ConfigError::env_parse(env_var_name("SERIAL_READ_TIMEOUT_MS"), "Invalid timeout")
    })?;
    config.serial.read_timeout_ms = Some(millis);
    Ok(())
}

fn set_log_level(config: &mut Config, value: String) -> ConfigResult<()> {
    config.logging.level = value;
    Ok(())
}

fn set_log_format(config: &mut Config, value: String) -> ConfigResult<()> {
    config.logging.format = match value.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        "pretty" => LogFormat::Pretty,
        "compact" => LogFormat::Compact,
        _ => {
            return Err(ConfigError::env_parse(
                env_var_name("LOG_FORMAT"),
                "Expected json, pretty or compact",
            ))
        }
    };
    Ok(())
}

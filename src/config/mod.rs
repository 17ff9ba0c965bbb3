//! Configuration module for rs485_link.
//!
//! TOML configuration with environment variable overrides. Configuration is
//! only ever read; nothing is written back.
//!
//! # Configuration Resolution
//!
//! 1. `RS485_LINK_CONFIG` environment variable (explicit path)
//! 2. `./rs485_link.toml` (current directory)
//! 3. `<platform config dir>/rs485_link/config.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Example
//!
//! ```toml
//! [serial]
//! port = "COM32"
//! baud = 9600
//! # read_timeout_ms = 5000
//!
//! [serial.port_aliases]
//! bus = "/dev/ttyUSB0"
//!
//! [transmit]
//! payload = ["A", "B", "C"]
//! step_through = true
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TransmitConfig};

//! RS-485 half-duplex serial library.
//!
//! Core functionality behind the `rs485_link` tools: a serial session that
//! switches an RS-485 transceiver between receive and transmit with the RTS
//! and DTR lines, reads carriage-return terminated lines and writes raw bytes.
//!
//! # Modules
//!
//! - `session`: the half-duplex session (open, direction, read, write, close)
//! - `port`: port abstraction over the `serialport` crate, plus a mock
//! - `service`: receive, transmit and console loops over a session
//! - `console`: banner, prompts and received-line rendering
//! - `discovery`: serial port enumeration
//! - `config`: configuration with TOML support
//! - `logging`: tracing subscriber setup
//! - `error`: unified error for the binary

pub mod config;
pub mod console;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod port;
pub mod service;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{AppError, AppResult};
pub use port::{Framing, LineLevel, MockSerialPort, PortError, SerialPortAdapter, SyncSerialPort};
pub use service::{
    ConsoleSummary, ReceiveOptions, ReceiveSummary, ServiceError, ServiceResult, StopReason,
    TransmitSummary,
};
pub use session::{
    CloseHandle, Direction, HalfDuplexSession, SessionConfig, SessionError, SessionResult,
    SessionStats,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};

//! Session error types.

use super::direction::Direction;
use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by [`HalfDuplexSession`](super::HalfDuplexSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The device could not be opened. Nothing is left acquired.
    #[error("Cannot open {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: PortError,
    },

    /// The OS rejected a write; the session has been closed.
    #[error("Write failed: {0}")]
    Write(#[source] PortError),

    /// A write was attempted after the session was closed.
    #[error("Write attempted on a closed session")]
    WriteClosed,

    /// The operation needs the transceiver pointed the other way.
    #[error("Operation requires {expected} direction, but the session is set to {actual}")]
    WrongDirection {
        expected: Direction,
        actual: Direction,
    },

    /// No direction has been selected since the port was opened.
    #[error("Direction has not been set since the port was opened")]
    DirectionNotSet,

    /// No terminated line arrived within the configured read timeout.
    #[error("No complete line received within {0:?}")]
    ReadTimeout(Duration),

    /// The session was closed, possibly from another thread.
    #[error("Session is closed")]
    Closed,

    /// The device failed during a read or control-line update.
    #[error(transparent)]
    Port(#[from] PortError),
}

impl SessionError {
    /// True for failures to acquire the device.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// True for failures on the transmit path.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_) | Self::WriteClosed)
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

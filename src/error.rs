use crate::config::ConfigError;
use crate::console::ConsoleError;
use crate::port::PortError;
use crate::service::ServiceError;
use crate::session::SessionError;
use thiserror::Error;

/// A specialized `Result` type for the command-line entry points.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error type.
///
/// Library modules return their own error types; this only gathers them
/// where the binary has to report one.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Console(#[from] ConsoleError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("A serialization error occurred: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

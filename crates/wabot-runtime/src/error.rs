//! Runtime error types.

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};
pub use crate::session::{SessionError, SessionResult};

/// Errors that end [`BotRuntime::run`](crate::BotRuntime::run).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The session could not be restored or persisted.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No transport was supplied to the builder.
    #[error("No transport configured")]
    MissingTransport,

    /// Installing the shutdown signal handler failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

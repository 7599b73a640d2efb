//! Error types for the wabot framework.

use thiserror::Error;
use wabot_core::ApiError;

/// Errors raised while registering commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A pattern or alias is already taken by another command.
    #[error("command name '{name}' is already registered by '{existing}'")]
    Conflict {
        /// The colliding name (lower-cased).
        name: String,
        /// Pattern of the command that already owns the name.
        existing: String,
    },

    /// A command was registered with an empty pattern.
    #[error("command pattern must not be empty")]
    EmptyPattern,
}

/// Errors returned by command and reply handlers.
///
/// Handler errors never escape the dispatch boundary; they are logged and
/// answered with a generic failure reply.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// A call through the bot handle failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The handler rejected its arguments.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Custom failure.
    #[error("{0}")]
    Custom(String),
}

impl HandlerError {
    /// Creates a custom handler error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for command registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Result type for handler bodies.
pub type HandlerResult = Result<(), HandlerError>;

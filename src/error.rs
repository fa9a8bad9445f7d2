//! Error types for a3s-command

use thiserror::Error;

/// Boxed error returned by command handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while acquiring and dispatching updates
#[derive(Debug, Error)]
pub enum CommandError {
    /// Transport or network failure while fetching a batch
    #[error("Failed to acquire updates: {0}")]
    Acquisition(String),

    /// Manual trigger named a command that is not registered
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A command handler failed
    #[error("Command '{command}' failed: {source}")]
    HandlerExecution {
        command: String,
        #[source]
        source: BoxError,
    },

    /// The cursor-advancing confirmation request failed
    #[error("Failed to acknowledge updates up to offset {offset}: {reason}")]
    Acknowledgment {
        offset: i64,
        reason: String,
    },

    /// Command name or alias collision
    #[error("Command registration error: {0}")]
    Registration(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Cursor persistence failure
    #[error("Cursor store error: {0}")]
    Cursor(String),
}

impl CommandError {
    /// Wrap a handler failure with the name of the command that raised it
    pub fn handler(command: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::HandlerExecution {
            command: command.into(),
            source: source.into(),
        }
    }
}

/// Result type alias for command operations
pub type Result<T> = std::result::Result<T, CommandError>;

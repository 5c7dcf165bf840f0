//! Error types for conversation operations.

use thiserror::Error;

/// Errors raised by the store and the conversation service.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A required field is missing or invalid.
    #[error("{0}")]
    Validation(String),

    /// The requested conversation does not exist.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// The state file could not be written.
    #[error("failed to persist state: {0}")]
    Persistence(String),
}

impl ChatError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build a not-found error for a conversation id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }
}

/// Convenience result alias for conversation operations.
pub type ChatResult<T> = Result<T, ChatError>;

//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while saving or loading checkpoints
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the requested session
    #[error("no checkpoint for session '{0}'")]
    NotFound(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Backend storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// The checkpoint or its key is malformed
    #[error("invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Create a storage error from any displayable cause.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid-checkpoint error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

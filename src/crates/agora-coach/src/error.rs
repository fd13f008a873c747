//! Error types for the coaching application.

use agora_checkpoint::CheckpointError;
use agora_graph::GraphError;
use thiserror::Error;

/// Result type for coaching operations
pub type Result<T> = std::result::Result<T, CoachError>;

/// Errors surfaced by the coaching runner, CLI, and model layer
#[derive(Error, Debug)]
pub enum CoachError {
    /// A session with this id already has a checkpoint
    #[error("session '{0}' already exists; resume it or pick another id")]
    SessionExists(String),

    /// No checkpoint exists for this session id
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// Workflow engine failure
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Checkpoint store failure outside an engine run
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Chat model call failed
    #[error("model error: {0}")]
    Model(String),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoachError {
    /// Create a model error from any displayable cause.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

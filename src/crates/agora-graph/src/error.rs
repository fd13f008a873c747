//! Error types for graph construction and execution.
//!
//! The taxonomy is deliberately small and maps one-to-one onto how a run can go wrong:
//! [`GraphError::Configuration`] at build time, [`GraphError::MalformedUpdate`] when a
//! task's output violates the state schema, [`GraphError::TaskExecution`] when a task
//! itself fails, and [`GraphError::Checkpoint`] when persistence fails (always fatal:
//! continuing without a durable checkpoint would make resume unsafe). The engine never
//! retries; surfacing the failing node to the caller is the whole recovery story.

use agora_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or running a workflow graph.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The graph definition is invalid. Raised at build time, never mid-run.
    #[error("graph configuration error: {0}")]
    Configuration(String),

    /// A task returned an update that violates the state schema.
    #[error("malformed update for field '{field}': {reason}")]
    MalformedUpdate { field: String, reason: String },

    /// A task failed while executing. Fatal to its step (and to its whole
    /// fan-out group, whose partial results are discarded).
    #[error("task '{node}' failed: {message}")]
    TaskExecution { node: String, message: String },

    /// Persisting a checkpoint failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// State could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a malformed-update error for a named field.
    pub fn malformed_update(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUpdate {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a task-execution error for a named node.
    pub fn task_execution(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskExecution {
            node: node.into(),
            message: message.into(),
        }
    }
}

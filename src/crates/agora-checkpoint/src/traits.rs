//! The checkpoint store trait.
//!
//! A store keeps **one** checkpoint per session and overwrites it on every save. That is
//! the whole persistence contract of the engine: after each completed step the engine
//! calls [`CheckpointStore::save`] before scheduling anything else, so on a crash at most
//! one in-flight step is lost and [`CheckpointStore::load`] hands back exactly where to
//! pick up.
//!
//! Implementations must serialize saves for the same session (the engine is the only
//! writer per session, but the store may not assume it) while letting distinct sessions
//! write concurrently.

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence backend for session checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Write the checkpoint, replacing any previous record for the same session.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load the current checkpoint for a session, if one exists.
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>>;

    /// Remove a session's checkpoint. Removing a missing session is not an error.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Session ids with a stored checkpoint, sorted for stable output.
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Whether a checkpoint exists for the session.
    async fn contains(&self, session_id: &str) -> Result<bool> {
        Ok(self.load(session_id).await?.is_some())
    }
}

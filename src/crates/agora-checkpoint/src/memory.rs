//! In-memory checkpoint store for development and testing.
//!
//! Keeps the single live checkpoint per session in an `Arc<RwLock<HashMap>>`. Nothing
//! survives a process restart, which makes this backend a fit for tests, benches, and
//! one-shot runs where resume-after-crash is not needed. Cloning the store clones the
//! handle, not the data.

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::traits::CheckpointStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory implementation of [`CheckpointStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    records: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently holding a checkpoint.
    pub async fn session_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Drop every stored checkpoint. Test helper.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(checkpoint.session_id.clone(), checkpoint);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let records = self.records.read().await;
        Ok(records.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let mut sessions: Vec<String> = records.keys().cloned().collect();
        sessions.sort();
        Ok(sessions)
    }
}

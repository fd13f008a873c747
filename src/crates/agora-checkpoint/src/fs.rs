//! Filesystem checkpoint store.
//!
//! One `<sessionId>.json` file per session inside a flat directory. Saves go through a
//! temp file followed by a rename, so a crash mid-write never corrupts the previous
//! checkpoint, and a per-session lock serializes writers while distinct sessions write
//! concurrently. Files are pretty-printed JSON in the documented checkpoint layout, so a
//! stuck session can be inspected with nothing more than `cat`.

use crate::checkpoint::Checkpoint;
use crate::error::{CheckpointError, Result};
use crate::serializer::{JsonSerializer, SerializerProtocol};
use crate::traits::CheckpointStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// [`CheckpointStore`] backed by one JSON file per session.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    serializer: JsonSerializer,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileCheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            serializer: JsonSerializer::new(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding the checkpoint files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        if session_id.is_empty()
            || session_id.contains(['/', '\\', '\0'])
            || session_id == "."
            || session_id == ".."
        {
            return Err(CheckpointError::invalid(format!(
                "session id '{}' is not a valid file name",
                session_id
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(session_id.to_string()).or_default().clone()
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.session_id)?;
        let bytes = self.serializer.dumps(&checkpoint)?;

        let lock = self.session_lock(&checkpoint.session_id).await;
        let _guard = lock.lock().await;

        // Write-then-rename keeps the previous checkpoint intact on a crash.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(session_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(self.serializer.loads(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.path_for(session_id)?;

        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                sessions.push(stem.to_string());
            }
        }
        sessions.sort();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::StepCursor;
    use serde_json::json;

    fn checkpoint(session: &str, step: u64) -> Checkpoint {
        Checkpoint::new(session, StepCursor::group("analysis"), json!({"step": step}))
            .with_step(step)
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        store.save(checkpoint("s1", 3)).await.unwrap();
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.metadata.step, 3);
        assert_eq!(loaded.cursor, StepCursor::group("analysis"));
    }

    #[tokio::test]
    async fn file_on_disk_uses_documented_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        store.save(checkpoint("s1", 1)).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("s1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["stepCursor"]["kind"], "group");
        assert!(value["session"].is_object());
    }

    #[tokio::test]
    async fn overwrite_keeps_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        store.save(checkpoint("s1", 1)).await.unwrap();
        store.save(checkpoint("s1", 2)).await.unwrap();

        assert_eq!(store.list_sessions().await.unwrap(), vec!["s1"]);
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.metadata.step, 2);
    }

    #[tokio::test]
    async fn missing_session_loads_none_and_delete_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        assert!(store.load("ghost").await.unwrap().is_none());
        store.delete("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn list_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        store.save(checkpoint("b", 1)).await.unwrap();
        store.save(checkpoint("a", 1)).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list_sessions().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn hostile_session_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        for bad in ["", "..", "a/b", "a\\b"] {
            let err = store.load(bad).await.unwrap_err();
            assert!(matches!(err, CheckpointError::Invalid(_)), "{bad}");
        }
    }
}

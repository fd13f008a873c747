//! Checkpoint records and the resumption cursor.
//!
//! A session has exactly one live [`Checkpoint`]: the store overwrites it after every
//! completed step. The record carries the full serialized session state plus a
//! [`StepCursor`] naming the node or fan-out group that should run next, which is what
//! makes resuming a run cheap: no replay, just load and continue.
//!
//! Persisted layout (JSON backends):
//!
//! ```json
//! {
//!   "sessionId": "…",
//!   "checkpointId": "…",
//!   "stepCursor": {"kind": "group", "id": "analysis"},
//!   "session": { … },
//!   "metadata": {"step": 4, "savedAt": "…", "extra": {}}
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Where execution resumes: the next unit of work, or nothing if the run finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StepCursor {
    /// A single node runs next.
    Node(String),
    /// A fan-out group runs next.
    Group(String),
    /// The terminal node has been committed; the run is over.
    Done,
}

impl StepCursor {
    /// Cursor pointing at a single node.
    pub fn node(id: impl Into<String>) -> Self {
        Self::Node(id.into())
    }

    /// Cursor pointing at a fan-out group.
    pub fn group(id: impl Into<String>) -> Self {
        Self::Group(id.into())
    }

    /// True once the run has committed its terminal step.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for StepCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node:{}", id),
            Self::Group(id) => write!(f, "group:{}", id),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Bookkeeping attached to every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    /// Number of completed steps at the time of the save.
    pub step: u64,
    /// When the checkpoint was written.
    pub saved_at: DateTime<Utc>,
    /// Caller-defined extras (e.g. run configuration needed to resume).
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self {
            step: 0,
            saved_at: Utc::now(),
            extra: HashMap::new(),
        }
    }

    /// Set the completed-step count.
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Attach a single extra entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl Default for CheckpointMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A durable snapshot of one session: serialized state plus the resumption cursor.
///
/// Checkpoints for the same session replace each other; `checkpoint_id` distinguishes
/// individual saves in logs and audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Session this checkpoint belongs to.
    pub session_id: String,
    /// Unique id of this particular save.
    pub checkpoint_id: String,
    /// Next unit of work when the session is resumed.
    #[serde(rename = "stepCursor")]
    pub cursor: StepCursor,
    /// Full serialized session state.
    #[serde(rename = "session")]
    pub state: Value,
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Create a checkpoint for `session_id` with a fresh checkpoint id.
    pub fn new(session_id: impl Into<String>, cursor: StepCursor, state: Value) -> Self {
        Self {
            session_id: session_id.into(),
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            cursor,
            state,
            metadata: CheckpointMetadata::new(),
        }
    }

    /// Set the completed-step count in the metadata.
    pub fn with_step(mut self, step: u64) -> Self {
        self.metadata.step = step;
        self
    }

    /// Replace the metadata extras wholesale.
    pub fn with_extra(mut self, extra: HashMap<String, Value>) -> Self {
        self.metadata.extra = extra;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cursor_roundtrip() {
        for cursor in [
            StepCursor::node("intake"),
            StepCursor::group("analysis"),
            StepCursor::Done,
        ] {
            let encoded = serde_json::to_string(&cursor).unwrap();
            let decoded: StepCursor = serde_json::from_str(&encoded).unwrap();
            assert_eq!(cursor, decoded);
        }
    }

    #[test]
    fn cursor_wire_format() {
        let encoded = serde_json::to_value(StepCursor::group("analysis")).unwrap();
        assert_eq!(encoded, json!({"kind": "group", "id": "analysis"}));
        assert_eq!(
            serde_json::to_value(StepCursor::Done).unwrap(),
            json!({"kind": "done"})
        );
    }

    #[test]
    fn cursor_display() {
        assert_eq!(StepCursor::node("intake").to_string(), "node:intake");
        assert_eq!(StepCursor::Done.to_string(), "done");
        assert!(StepCursor::Done.is_done());
        assert!(!StepCursor::node("intake").is_done());
    }

    #[test]
    fn checkpoint_layout_uses_camel_case_names() {
        let checkpoint = Checkpoint::new(
            "session-1",
            StepCursor::node("fallacyDetector"),
            json!({"roundNumber": 1}),
        )
        .with_step(1);

        let value = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(value["sessionId"], "session-1");
        assert_eq!(value["stepCursor"]["kind"], "node");
        assert_eq!(value["stepCursor"]["id"], "fallacyDetector");
        assert_eq!(value["session"]["roundNumber"], 1);
        assert_eq!(value["metadata"]["step"], 1);
        assert!(value["checkpointId"].is_string());
    }

    #[test]
    fn checkpoint_roundtrip_preserves_state() {
        let checkpoint = Checkpoint::new("s", StepCursor::Done, json!({"verdict": "won"}))
            .with_step(9)
            .with_extra(HashMap::from([("maxRounds".to_string(), json!(3))]));

        let bytes = serde_json::to_vec(&checkpoint).unwrap();
        let restored: Checkpoint = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(checkpoint, restored);
        assert_eq!(restored.metadata.extra["maxRounds"], json!(3));
    }

    #[test]
    fn fresh_checkpoints_get_distinct_ids() {
        let a = Checkpoint::new("s", StepCursor::Done, json!({}));
        let b = Checkpoint::new("s", StepCursor::Done, json!({}));
        assert_ne!(a.checkpoint_id, b.checkpoint_id);
    }
}

//! Execution lifecycle events.
//!
//! The engine reports progress through an [`EventSink`] instead of printing. Sinks are
//! synchronous and must not block: the bundled implementations forward to an unbounded
//! channel ([`ChannelSink`]), log via `tracing` ([`TracingSink`]), or drop everything
//! ([`NullSink`]).

use agora_checkpoint::StepCursor;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event emitted at each engine lifecycle point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A run (fresh or resumed) began driving the graph.
    RunStarted {
        session_id: String,
        cursor: StepCursor,
    },
    /// A single node began executing.
    NodeStarted { node: String, step: u64 },
    /// A single node finished and its update was folded.
    NodeFinished { node: String, step: u64 },
    /// All members of a fan-out group were spawned.
    GroupStarted {
        group: String,
        members: Vec<String>,
        step: u64,
    },
    /// A fan-out group completed and folded; `branch` is the conditional label taken,
    /// if the group exits through the conditional edge.
    GroupFinished {
        group: String,
        step: u64,
        branch: Option<String>,
    },
    /// A checkpoint was written after a completed step.
    CheckpointSaved {
        session_id: String,
        step: u64,
        cursor: StepCursor,
    },
    /// A step failed and the run is aborting; `unit` is the node or group that was
    /// executing.
    StepFailed {
        unit: String,
        step: u64,
        error: String,
    },
    /// The run reached the terminal node.
    RunFinished { session_id: String, steps: u64 },
    /// The run stopped at a step boundary after cancellation.
    RunCancelled { session_id: String, cursor: StepCursor },
}

impl EngineEvent {
    /// Short name of the event variant, for logs and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::NodeStarted { .. } => "node_started",
            Self::NodeFinished { .. } => "node_finished",
            Self::GroupStarted { .. } => "group_started",
            Self::GroupFinished { .. } => "group_finished",
            Self::CheckpointSaved { .. } => "checkpoint_saved",
            Self::StepFailed { .. } => "step_failed",
            Self::RunFinished { .. } => "run_finished",
            Self::RunCancelled { .. } => "run_cancelled",
        }
    }
}

/// Receiver of engine lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Sink that forwards events to an unbounded channel.
///
/// A dropped receiver is not an error; the engine keeps running and further events are
/// discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink that writes events to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::RunStarted { session_id, cursor } => {
                tracing::info!(session_id, %cursor, "run started");
            }
            EngineEvent::NodeStarted { node, step } => {
                tracing::debug!(node, step, "node started");
            }
            EngineEvent::NodeFinished { node, step } => {
                tracing::debug!(node, step, "node finished");
            }
            EngineEvent::GroupStarted { group, members, step } => {
                tracing::debug!(group, ?members, step, "group started");
            }
            EngineEvent::GroupFinished { group, step, branch } => {
                tracing::debug!(group, step, ?branch, "group finished");
            }
            EngineEvent::CheckpointSaved { session_id, step, cursor } => {
                tracing::debug!(session_id, step, %cursor, "checkpoint saved");
            }
            EngineEvent::StepFailed { unit, step, error } => {
                tracing::error!(unit, step, error, "step failed");
            }
            EngineEvent::RunFinished { session_id, steps } => {
                tracing::info!(session_id, steps, "run finished");
            }
            EngineEvent::RunCancelled { session_id, cursor } => {
                tracing::info!(session_id, %cursor, "run cancelled");
            }
        }
    }
}

//! Session lifecycle: start, resume, inspect, list.
//!
//! [`DebateCoach`] owns the model, the checkpoint store, and the run
//! settings; each call wires a fresh engine around them. The round limit
//! travels inside the checkpoint metadata, so resuming a session needs
//! nothing but its id.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use agora_checkpoint::{CheckpointStore, StepCursor};
use agora_graph::{Engine, EventSink, NullSink, RunOutcome, RunStatus, DEFAULT_CANCELLATION_GRACE};

use crate::error::{CoachError, Result};
use crate::model::ChatModel;
use crate::session::{session_schema, DebateSession};
use crate::workflow::debate_graph;

/// Rounds played when the caller does not say otherwise.
pub const DEFAULT_MAX_ROUNDS: u64 = 3;

/// Checkpoint metadata key carrying the session's round limit.
const MAX_ROUNDS_KEY: &str = "maxRounds";

/// How a session run ended, with the session parsed back out of the state.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: RunStatus,
    pub session: DebateSession,
    /// Steps committed across the session's whole life, resumes included.
    pub steps: u64,
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    fn from_run(outcome: RunOutcome) -> Result<Self> {
        Ok(Self {
            status: outcome.status,
            session: serde_json::from_value(outcome.state)?,
            steps: outcome.steps,
        })
    }
}

/// A stored session as of its last committed step.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub cursor: StepCursor,
    pub step: u64,
    pub session: DebateSession,
}

/// Entry point for running coaching sessions.
pub struct DebateCoach {
    model: Arc<dyn ChatModel>,
    store: Arc<dyn CheckpointStore>,
    sink: Arc<dyn EventSink>,
    grace: Duration,
}

impl DebateCoach {
    pub fn new(model: Arc<dyn ChatModel>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            model,
            store,
            sink: Arc::new(NullSink),
            grace: DEFAULT_CANCELLATION_GRACE,
        }
    }

    /// Sends engine events to `sink` for every run this coach starts.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Grace period granted to in-flight work on cancellation.
    pub fn with_cancellation_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs a new session to completion.
    pub async fn start_session(
        &self,
        topic: &str,
        position: &str,
        session_id: &str,
        max_rounds: Option<u64>,
    ) -> Result<SessionOutcome> {
        self.start_session_with_cancellation(
            topic,
            position,
            session_id,
            max_rounds,
            CancellationToken::new(),
        )
        .await
    }

    /// Runs a new session until it completes or `cancel` fires.
    pub async fn start_session_with_cancellation(
        &self,
        topic: &str,
        position: &str,
        session_id: &str,
        max_rounds: Option<u64>,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome> {
        let max_rounds = max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS);
        if max_rounds == 0 {
            return Err(CoachError::config("maxRounds must be at least 1"));
        }
        if self.store.contains(session_id).await? {
            return Err(CoachError::SessionExists(session_id.to_string()));
        }

        info!(session_id, topic, max_rounds, "starting session");
        let engine = self.engine(max_rounds)?;
        let initial = serde_json::to_value(DebateSession::new(topic, position))?;
        let outcome = engine
            .run_with_cancellation(session_id, initial, cancel)
            .await?;
        SessionOutcome::from_run(outcome)
    }

    /// Picks a session back up from its checkpoint and drives it to the end.
    /// Finished sessions come back unchanged.
    pub async fn resume_session(&self, session_id: &str) -> Result<SessionOutcome> {
        self.resume_session_with_cancellation(session_id, CancellationToken::new())
            .await
    }

    /// Resumes until the session completes or `cancel` fires.
    pub async fn resume_session_with_cancellation(
        &self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome> {
        let checkpoint = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))?;
        let max_rounds = checkpoint
            .metadata
            .extra
            .get(MAX_ROUNDS_KEY)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_MAX_ROUNDS);

        info!(session_id, max_rounds, step = checkpoint.metadata.step, "resuming session");
        let engine = self.engine(max_rounds)?;
        let outcome = engine
            .resume_with_cancellation(session_id, cancel)
            .await?;
        SessionOutcome::from_run(outcome)
    }

    /// The stored state of a session, without running anything.
    pub async fn inspect(&self, session_id: &str) -> Result<SessionSnapshot> {
        let checkpoint = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))?;
        Ok(SessionSnapshot {
            session_id: checkpoint.session_id.clone(),
            cursor: checkpoint.cursor.clone(),
            step: checkpoint.metadata.step,
            session: serde_json::from_value(checkpoint.state)?,
        })
    }

    /// Ids of every stored session.
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self.store.list_sessions().await?)
    }

    fn engine(&self, max_rounds: u64) -> Result<Engine> {
        let graph = debate_graph(self.model.clone(), max_rounds)?;
        Ok(Engine::new(graph, session_schema(), self.store.clone())
            .with_event_sink(self.sink.clone())
            .with_cancellation_grace(self.grace)
            .with_checkpoint_extra(MAX_ROUNDS_KEY, json!(max_rounds)))
    }
}

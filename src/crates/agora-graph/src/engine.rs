//! Step-driven graph execution.
//!
//! The engine drives a [`Graph`] one step at a time. A step is either a single node or
//! a whole fan-out group; in both cases the unit commits atomically:
//!
//! ```text
//!   ┌────────────────────── drive loop ───────────────────────┐
//!   │  cursor ──> execute node / spawn group ──> fold updates │
//!   │     ^                                          │        │
//!   │     │      checkpoint (state, next cursor) <───┘        │
//!   └─────┴───────────────────────────────────────────────────┘
//! ```
//!
//! Group members each receive a clone of the state taken before the group started, so
//! no member observes another member's partial output. Their updates fold in declared
//! member order regardless of completion order, which keeps reruns deterministic. If
//! any member fails, every update from that group is discarded and the state is left
//! exactly as it was before the group began.
//!
//! A checkpoint is written after every completed step and carries the *next* cursor,
//! so a resumed run re-executes nothing that already committed. Failure to write a
//! checkpoint aborts the run; the engine never advances past unrecorded progress.
//!
//! Cancellation is observed at step boundaries. An in-flight fan-out gets a bounded
//! grace period to wind down; whatever it produced afterwards is discarded, leaving
//! the last checkpoint as the resume point.

use crate::error::{GraphError, Result};
use crate::event::{EngineEvent, EventSink, NullSink};
use crate::graph::{FanOutGroup, Graph};
use crate::state::StateSchema;
use agora_checkpoint::{Checkpoint, CheckpointError, CheckpointStore, StepCursor};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// How long an in-flight fan-out group may keep running after cancellation.
pub const DEFAULT_CANCELLATION_GRACE: Duration = Duration::from_secs(2);

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The terminal node committed; the workflow is over.
    Completed,
    /// Cancellation stopped the run at a step boundary.
    Cancelled,
}

/// Result of driving a session, whether to completion or to a cancellation point.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// State as of the last committed step.
    pub state: Value,
    /// Next unit of work ([`StepCursor::Done`] once completed).
    pub cursor: StepCursor,
    /// Completed steps over the whole session, including steps before a resume.
    pub steps: u64,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Executes a [`Graph`] against a [`StateSchema`], checkpointing into a
/// [`CheckpointStore`].
pub struct Engine {
    graph: Graph,
    schema: StateSchema,
    store: Arc<dyn CheckpointStore>,
    sink: Arc<dyn EventSink>,
    grace: Duration,
    extra: HashMap<String, Value>,
}

impl Engine {
    pub fn new(graph: Graph, schema: StateSchema, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph,
            schema,
            store,
            sink: Arc::new(NullSink),
            grace: DEFAULT_CANCELLATION_GRACE,
            extra: HashMap::new(),
        }
    }

    /// Install a lifecycle event sink.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Override the cancellation grace period for in-flight groups.
    pub fn with_cancellation_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Attach an extra metadata entry to every checkpoint this engine writes.
    ///
    /// Useful for run configuration that a resume needs before the graph can be
    /// rebuilt, e.g. a round limit.
    pub fn with_checkpoint_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Start a fresh session from the entry node.
    ///
    /// Any existing checkpoint for `session_id` is overwritten as steps commit;
    /// callers that must not clobber a session check the store first.
    pub async fn run(&self, session_id: &str, initial_state: Value) -> Result<RunOutcome> {
        self.run_with_cancellation(session_id, initial_state, CancellationToken::new())
            .await
    }

    /// Start a fresh session, stopping early if `cancel` fires.
    pub async fn run_with_cancellation(
        &self,
        session_id: &str,
        initial_state: Value,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        if !initial_state.is_object() {
            return Err(GraphError::configuration(
                "initial state must be a JSON object",
            ));
        }
        let cursor = StepCursor::node(self.graph.entry());
        self.drive(session_id, initial_state, cursor, 0, &cancel)
            .await
    }

    /// Resume a session from its checkpoint.
    ///
    /// Fails with [`CheckpointError::NotFound`] when the session has never been
    /// checkpointed. Resuming a completed session returns immediately with the
    /// terminal state.
    pub async fn resume(&self, session_id: &str) -> Result<RunOutcome> {
        self.resume_with_cancellation(session_id, CancellationToken::new())
            .await
    }

    /// Resume a session, stopping early if `cancel` fires.
    pub async fn resume_with_cancellation(
        &self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let checkpoint = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(session_id.to_string()))?;
        self.drive(
            session_id,
            checkpoint.state,
            checkpoint.cursor,
            checkpoint.metadata.step,
            &cancel,
        )
        .await
    }

    async fn drive(
        &self,
        session_id: &str,
        mut state: Value,
        mut cursor: StepCursor,
        mut step: u64,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        self.sink.emit(EngineEvent::RunStarted {
            session_id: session_id.to_string(),
            cursor: cursor.clone(),
        });

        loop {
            if cursor.is_done() {
                self.sink.emit(EngineEvent::RunFinished {
                    session_id: session_id.to_string(),
                    steps: step,
                });
                return Ok(RunOutcome {
                    status: RunStatus::Completed,
                    state,
                    cursor,
                    steps: step,
                });
            }
            if cancel.is_cancelled() {
                return Ok(self.cancelled(session_id, state, cursor, step));
            }

            let (next_cursor, unit) = match cursor.clone() {
                StepCursor::Node(node) => {
                    self.sink.emit(EngineEvent::NodeStarted {
                        node: node.clone(),
                        step: step + 1,
                    });
                    let executor = self
                        .graph
                        .executor(&node)
                        .map_err(|err| self.fail(&node, step + 1, err))?;
                    let fut = executor.execute(state.clone());
                    let update = tokio::select! {
                        result = fut => result
                            .map_err(|err| self.fail(&node, step + 1, as_task_error(&node, err)))?,
                        _ = cancel.cancelled() => {
                            return Ok(self.cancelled(session_id, state, cursor, step));
                        }
                    };
                    state = self
                        .schema
                        .apply(&state, &update)
                        .map_err(|err| self.fail(&node, step + 1, err))?;
                    self.sink.emit(EngineEvent::NodeFinished {
                        node: node.clone(),
                        step: step + 1,
                    });
                    (self.graph.transition_after(&node), node)
                }
                StepCursor::Group(group_id) => {
                    let group = self
                        .graph
                        .group(&group_id)
                        .map_err(|err| self.fail(&group_id, step + 1, err))?
                        .clone();
                    self.sink.emit(EngineEvent::GroupStarted {
                        group: group_id.clone(),
                        members: group.members.clone(),
                        step: step + 1,
                    });
                    let maybe_updates = self
                        .execute_group(&group, &state, cancel)
                        .await
                        .map_err(|err| self.fail(&group_id, step + 1, err))?;
                    let Some(updates) = maybe_updates else {
                        return Ok(self.cancelled(session_id, state, cursor, step));
                    };
                    let mut folded = state.clone();
                    for (member, update) in group.members.iter().zip(&updates) {
                        folded = self.schema.apply(&folded, update).map_err(|err| {
                            tracing::warn!(group = %group_id, node = %member, error = %err, "discarding group updates");
                            self.fail(&group_id, step + 1, err)
                        })?;
                    }
                    state = folded;
                    let (target, branch) = self
                        .graph
                        .group_exit(&group_id, &state)
                        .map_err(|err| self.fail(&group_id, step + 1, err))?;
                    self.sink.emit(EngineEvent::GroupFinished {
                        group: group_id.clone(),
                        step: step + 1,
                        branch,
                    });
                    (StepCursor::Node(target), group_id)
                }
                StepCursor::Done => unreachable!("handled at loop top"),
            };

            step += 1;
            let checkpoint = Checkpoint::new(session_id, next_cursor.clone(), state.clone())
                .with_step(step)
                .with_extra(self.extra.clone());
            self.store
                .save(checkpoint)
                .await
                .map_err(|err| self.fail(&unit, step, GraphError::from(err)))?;
            self.sink.emit(EngineEvent::CheckpointSaved {
                session_id: session_id.to_string(),
                step,
                cursor: next_cursor.clone(),
            });
            cursor = next_cursor;
        }
    }

    /// Spawn every member of `group` against the same state snapshot and collect their
    /// updates in declared member order. Returns `None` when cancellation interrupted
    /// the group; any late results are discarded.
    async fn execute_group(
        &self,
        group: &FanOutGroup,
        state: &Value,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Value>>> {
        let mut executors = Vec::with_capacity(group.members.len());
        for member in &group.members {
            executors.push(self.graph.executor(member)?);
        }

        let mut handles = Vec::with_capacity(executors.len());
        for executor in executors {
            let snapshot = state.clone();
            handles.push(tokio::spawn(async move {
                executor.execute(snapshot).await
            }));
        }
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut join = join_all(handles);

        let results = tokio::select! {
            results = &mut join => results,
            _ = cancel.cancelled() => {
                if timeout(self.grace, &mut join).await.is_err() {
                    for abort in &aborts {
                        abort.abort();
                    }
                    let _ = join.await;
                }
                return Ok(None);
            }
        };

        let mut updates = Vec::with_capacity(results.len());
        for (member, joined) in group.members.iter().zip(results) {
            match joined {
                Ok(Ok(update)) => updates.push(update),
                Ok(Err(err)) => {
                    tracing::warn!(group = %group.id, node = %member, error = %err, "group member failed");
                    return Err(as_task_error(member, err));
                }
                Err(join_err) => {
                    return Err(GraphError::task_execution(
                        member,
                        format!("task aborted: {}", join_err),
                    ));
                }
            }
        }
        Ok(Some(updates))
    }

    fn fail(&self, unit: &str, step: u64, err: GraphError) -> GraphError {
        self.sink.emit(EngineEvent::StepFailed {
            unit: unit.to_string(),
            step,
            error: err.to_string(),
        });
        err
    }

    fn cancelled(
        &self,
        session_id: &str,
        state: Value,
        cursor: StepCursor,
        steps: u64,
    ) -> RunOutcome {
        self.sink.emit(EngineEvent::RunCancelled {
            session_id: session_id.to_string(),
            cursor: cursor.clone(),
        });
        RunOutcome {
            status: RunStatus::Cancelled,
            state,
            cursor,
            steps,
        }
    }
}

/// Errors escaping a node executor count as task failures unless already tagged.
fn as_task_error(node: &str, err: GraphError) -> GraphError {
    match err {
        GraphError::TaskExecution { .. } => err,
        other => GraphError::task_execution(node, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChannelSink;
    use crate::node::{FnNode, NodeExecutor};
    use crate::state::{append, replace};
    use agora_checkpoint::MemoryCheckpointStore;
    use serde_json::json;

    fn push_word(word: &'static str) -> Arc<dyn NodeExecutor> {
        Arc::new(FnNode::new(move |_| async move { Ok(json!({"words": [word]})) }))
    }

    fn linear_graph() -> Graph {
        Graph::builder()
            .add_node("first", push_word("one"))
            .add_node("second", push_word("two"))
            .set_entry("first")
            .add_edge("first", "second")
            .build()
            .unwrap()
    }

    fn word_schema() -> StateSchema {
        StateSchema::new()
            .field("words", append())
            .field("topic", replace())
    }

    #[tokio::test]
    async fn linear_run_completes_and_checkpoints() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let (sink, mut rx) = ChannelSink::unbounded();
        let engine = Engine::new(linear_graph(), word_schema(), store.clone())
            .with_event_sink(Arc::new(sink));

        let outcome = engine
            .run("s-1", json!({"topic": "tea", "words": []}))
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.cursor, StepCursor::Done);
        assert_eq!(outcome.state["words"], json!(["one", "two"]));

        let saved = store.load("s-1").await.unwrap().unwrap();
        assert_eq!(saved.cursor, StepCursor::Done);
        assert_eq!(saved.metadata.step, 2);
        assert_eq!(saved.state, outcome.state);

        drop(engine);
        let mut checkpoint_events = 0;
        while let Some(event) = rx.recv().await {
            if event.kind() == "checkpoint_saved" {
                checkpoint_events += 1;
            }
        }
        assert_eq!(checkpoint_events, 2);
    }

    #[tokio::test]
    async fn non_object_initial_state_is_rejected() {
        let engine = Engine::new(
            linear_graph(),
            word_schema(),
            Arc::new(MemoryCheckpointStore::new()),
        );
        let err = engine.run("s-1", json!(["not", "an", "object"])).await.unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn resume_of_unknown_session_is_not_found() {
        let engine = Engine::new(
            linear_graph(),
            word_schema(),
            Arc::new(MemoryCheckpointStore::new()),
        );
        let err = engine.resume("missing").await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::Checkpoint(CheckpointError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn resume_of_completed_session_returns_terminal_state() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let engine = Engine::new(linear_graph(), word_schema(), store.clone());
        engine
            .run("s-done", json!({"topic": "tea", "words": []}))
            .await
            .unwrap();

        let resumed = engine.resume("s-done").await.unwrap();
        assert!(resumed.is_completed());
        assert_eq!(resumed.steps, 2);
        assert_eq!(resumed.state["words"], json!(["one", "two"]));
    }

    #[tokio::test]
    async fn checkpoint_extras_ride_along() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let engine = Engine::new(linear_graph(), word_schema(), store.clone())
            .with_checkpoint_extra("maxRounds", json!(5));
        engine
            .run("s-extra", json!({"topic": "tea", "words": []}))
            .await
            .unwrap();

        let saved = store.load("s-extra").await.unwrap().unwrap();
        assert_eq!(saved.metadata.extra["maxRounds"], json!(5));
    }
}

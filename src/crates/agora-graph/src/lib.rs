//! Checkpointed workflow graphs with fan-out groups and a single conditional edge.
//!
//! `agora-graph` executes a fixed workflow over a JSON state document. The shape of
//! the workflow is declared once through [`Graph::builder`], the shape of the state
//! through a [`StateSchema`] mapping each field to a fold rule, and the [`Engine`]
//! drives the two against a pluggable checkpoint store.
//!
//! # Model
//!
//! - **Nodes** implement [`NodeExecutor`]: read a snapshot of the state, return a
//!   partial update. Nodes never mutate state directly.
//! - **Reducers** fold updates into state field by field: replace, append, or
//!   append-distinct keyed by an id field (see [`state`]).
//! - **Fan-out groups** run several nodes concurrently from the same snapshot and
//!   converge at a barrier; updates fold in declared order, so results are
//!   deterministic however the members interleave.
//! - **The conditional edge** hangs off one group's barrier and picks the next node
//!   from the folded state. At most one exists per graph, and it is evaluated exactly
//!   once per pass through its barrier.
//! - **Checkpoints** commit after every completed step with the cursor of the *next*
//!   step, so resuming never repeats committed work.
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_graph::{Engine, FnNode, Graph, StateSchema, state};
//! use agora_checkpoint::MemoryCheckpointStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let graph = Graph::builder()
//!     .add_node("greet", Arc::new(FnNode::new(|_| async {
//!         Ok(json!({"log": ["hello"]}))
//!     })))
//!     .set_entry("greet")
//!     .build()?;
//!
//! let schema = StateSchema::new().field("log", state::append());
//! let engine = Engine::new(graph, schema, Arc::new(MemoryCheckpointStore::new()));
//! let outcome = engine.run("session-1", json!({"log": []})).await?;
//! ```

pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod node;
pub mod state;

pub use engine::{Engine, RunOutcome, RunStatus, DEFAULT_CANCELLATION_GRACE};
pub use error::{GraphError, Result};
pub use event::{ChannelSink, EngineEvent, EventSink, NullSink, TracingSink};
pub use graph::{BranchRouter, FanOutGroup, Graph, GraphBuilder, NodeId};
pub use node::{FnNode, NodeExecutor};
pub use state::{append, append_distinct_by, replace, Reducer, StateSchema, ValidatorFn};

// The cursor type is shared with the checkpoint layer; re-exported so most callers
// need only this crate.
pub use agora_checkpoint::StepCursor;

//! The task contract between the engine and node implementations.
//!
//! A node receives an immutable snapshot of the session state and returns a partial
//! update containing only the fields it changes. It must not assume it sees concurrent siblings'
//! output (it never will), and it must be safe to re-run against the same snapshot: the
//! engine re-executes a step whose fold was never checkpointed.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// A unit of work in the graph.
///
/// Failure is signaled through the returned `Result`; the engine converts any error
/// into a task-execution failure attributed to the node. Recoverable problems inside
/// the task (a malformed reply from an external call, say) are the task's own business;
/// degrade to an empty update rather than failing the run.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute against a read-only snapshot, returning a partial state update.
    async fn execute(&self, snapshot: Value) -> Result<Value>;
}

/// Adapter turning an async closure into a [`NodeExecutor`].
///
/// Handy for small nodes and tests:
///
/// ```rust
/// use agora_graph::node::FnNode;
/// use agora_graph::Result;
/// use serde_json::{json, Value};
///
/// let bump = FnNode::new(|snapshot: Value| async move {
///     let round = snapshot["round"].as_u64().unwrap_or(0);
///     Result::Ok(json!({"round": round + 1}))
/// });
/// ```
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> NodeExecutor for FnNode<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn execute(&self, snapshot: Value) -> Result<Value> {
        (self.f)(snapshot).await
    }
}

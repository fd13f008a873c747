//! Debate coaching sessions over the agora workflow engine.
//!
//! This crate wires the seven coaching agents into an `agora-graph`
//! workflow: a fallacy detector opens each round, three analysts run
//! concurrently behind a barrier, and the loop ends with a coaching
//! report. [`DebateCoach`] is the programmatic entry point; the `agora`
//! binary wraps it for the terminal.

pub mod agents;
pub mod config;
pub mod error;
pub mod model;
pub mod prompts;
pub mod report;
pub mod runner;
pub mod session;
pub mod workflow;

pub use config::{CoachConfig, ModelConfig, Provider, RunConfig, StorageConfig};
pub use error::{CoachError, Result};
pub use model::{ChatModel, ChatRequest, HttpChatModel, ScriptedModel};
pub use runner::{DebateCoach, SessionOutcome, SessionSnapshot, DEFAULT_MAX_ROUNDS};
pub use session::{
    DebateSession, FallacyReport, Message, Role, ScoreCard, Severity,
};
pub use workflow::debate_graph;

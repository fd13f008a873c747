//! # agora-checkpoint: durable session snapshots
//!
//! Persistence layer for agora workflow runs. The engine checkpoints the full session
//! state after **every completed step** (a single node or a fully folded fan-out group),
//! and each session keeps exactly one live record, overwritten in place. Resuming a run
//! is therefore a constant-time load: the stored [`StepCursor`] names the next unit of
//! work and the stored state is the state it should see.
//!
//! ```text
//!   engine step loop                      CheckpointStore
//!   ─────────────────                     ───────────────
//!   run node / fold group      save()     ┌──────────────────────┐
//!   ───────────────────────►  overwrite   │ session-1 ─ {…, cursor}│
//!   schedule next step        ◄───────    │ session-2 ─ {…, cursor}│
//!                              load()     └──────────────────────┘
//! ```
//!
//! Two backends ship here: [`MemoryCheckpointStore`] for tests and one-shot runs, and
//! [`FileCheckpointStore`] for durable local persistence (one JSON file per session,
//! atomic overwrite). Custom backends implement [`CheckpointStore`].

pub mod checkpoint;
pub mod error;
pub mod fs;
pub mod memory;
pub mod serializer;
pub mod traits;

// Re-export main types
pub use checkpoint::{Checkpoint, CheckpointMetadata, StepCursor};
pub use error::{CheckpointError, Result};
pub use fs::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::CheckpointStore;

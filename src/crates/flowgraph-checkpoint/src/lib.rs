//! # flowgraph-checkpoint - State Persistence for Graph Runs
//!
//! **Checkpoint model and storage backends** used by `flowgraph-core` to make
//! graph runs resumable after a crash, an interrupt, or a deliberate fork.
//!
//! ## Overview
//!
//! A [`Checkpoint`] is an immutable snapshot of run state taken at a node
//! boundary. Checkpoints of one logical run share a `thread_id` and form an
//! append-only log ordered by `version`:
//!
//! - **Crash Recovery** - query the latest checkpoint, resume after its node
//! - **Human-in-the-Loop** - pause, edit state, resume
//! - **Time Travel** - resume from an older version; history branches instead
//!   of being overwritten
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Checkpoint`] | Versioned state snapshot |
//! | [`CheckpointDraft`] | Snapshot waiting for a version |
//! | [`CheckpointMetadata`] | Source, step, parent, next nodes, custom keys |
//! | [`CheckpointStore`] | Backend trait (save / load / list / delete + append) |
//! | [`InMemoryCheckpointStore`] | Process-local backend for tests and demos |
//! | [`FileCheckpointStore`] | JSON-file backend that survives restarts |
//!
//! ## Quick Start
//!
//! ```rust
//! use flowgraph_checkpoint::{CheckpointDraft, CheckpointStore, InMemoryCheckpointStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryCheckpointStore::new();
//!
//!     let saved = store
//!         .append(CheckpointDraft::new("thread-1", "validate", json!({"ok": true})))
//!         .await?;
//!
//!     let loaded = store.load(&saved.id).await?;
//!     assert_eq!(loaded, saved);
//!     assert_eq!(loaded.version, 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Version Assignment
//!
//! Versions are assigned by the store, never computed by the engine. The
//! provided [`CheckpointStore::append`] performs "read head, conditional
//! save, retry on conflict", which is safe for any backend whose `save`
//! rejects a taken `(thread_id, version)` slot.
//!
//! ## See Also
//!
//! - `flowgraph-core` - the execution engine that writes these checkpoints

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use checkpoint::{
    new_checkpoint_id, Checkpoint, CheckpointDraft, CheckpointId, CheckpointMetadata,
    CheckpointSource,
};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use traits::{CheckpointStore, MAX_APPEND_ATTEMPTS};

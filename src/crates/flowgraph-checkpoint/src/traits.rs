//! Storage trait for checkpoint backends
//!
//! [`CheckpointStore`] is the only thing the execution engine knows about
//! persistence. Four required operations cover every backend:
//!
//! | Method | Contract |
//! |--------|----------|
//! | `save` | Insert a checkpoint; fail with `VersionConflict` if its `(thread_id, version)` is taken |
//! | `load` | Fetch by id; fail with `NotFound` if absent |
//! | `list_by_thread` | All checkpoints of a thread, ascending by version |
//! | `delete_by_thread` | Drop a whole thread |
//!
//! Two provided operations build on them: [`latest`](CheckpointStore::latest)
//! and [`append`](CheckpointStore::append). `append` assigns the next version
//! with optimistic concurrency: it reads the head, tries `save`, and retries
//! when another writer won the slot. Backends that can do better (a single
//! lock, a database sequence) override it.
//!
//! # Implementing a Backend
//!
//! ```rust
//! use async_trait::async_trait;
//! use flowgraph_checkpoint::{Checkpoint, CheckpointError, CheckpointStore, Result};
//! use tokio::sync::Mutex;
//!
//! #[derive(Default)]
//! struct VecStore {
//!     rows: Mutex<Vec<Checkpoint<String>>>,
//! }
//!
//! #[async_trait]
//! impl CheckpointStore<String> for VecStore {
//!     async fn save(&self, checkpoint: Checkpoint<String>) -> Result<()> {
//!         let mut rows = self.rows.lock().await;
//!         if rows.iter().any(|c| c.thread_id == checkpoint.thread_id && c.version == checkpoint.version) {
//!             return Err(CheckpointError::VersionConflict {
//!                 thread_id: checkpoint.thread_id,
//!                 version: checkpoint.version,
//!             });
//!         }
//!         rows.push(checkpoint);
//!         Ok(())
//!     }
//!
//!     async fn load(&self, id: &str) -> Result<Checkpoint<String>> {
//!         self.rows.lock().await.iter().find(|c| c.id == id).cloned()
//!             .ok_or_else(|| CheckpointError::NotFound(id.to_string()))
//!     }
//!
//!     async fn list_by_thread(&self, thread_id: &str) -> Result<Vec<Checkpoint<String>>> {
//!         let mut out: Vec<_> = self.rows.lock().await.iter()
//!             .filter(|c| c.thread_id == thread_id).cloned().collect();
//!         out.sort_by_key(|c| c.version);
//!         Ok(out)
//!     }
//!
//!     async fn delete_by_thread(&self, thread_id: &str) -> Result<()> {
//!         self.rows.lock().await.retain(|c| c.thread_id != thread_id);
//!         Ok(())
//!     }
//! }
//! ```

use crate::checkpoint::{Checkpoint, CheckpointDraft};
use crate::error::{CheckpointError, Result};
use async_trait::async_trait;

/// How many times the provided `append` retries after losing a version race
pub const MAX_APPEND_ATTEMPTS: usize = 16;

/// Durable, append-only storage of checkpoints keyed by `(thread_id, version)`
#[async_trait]
pub trait CheckpointStore<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    /// Persist a checkpoint whose version was assigned by the caller
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<()>;

    /// Load a checkpoint by id
    async fn load(&self, id: &str) -> Result<Checkpoint<S>>;

    /// All checkpoints of a thread, sorted by ascending version
    async fn list_by_thread(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>>;

    /// Delete every checkpoint of a thread
    async fn delete_by_thread(&self, thread_id: &str) -> Result<()>;

    /// Highest-version checkpoint of a thread, if any
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>> {
        Ok(self
            .list_by_thread(thread_id)
            .await?
            .into_iter()
            .max_by_key(|c| c.version))
    }

    /// Store a draft under the next free version of its thread
    ///
    /// Returns the stored checkpoint. Concurrent writers are serialized by the
    /// conflict check in [`save`](CheckpointStore::save).
    async fn append(&self, draft: CheckpointDraft<S>) -> Result<Checkpoint<S>> {
        for _ in 0..MAX_APPEND_ATTEMPTS {
            let version = self
                .latest(&draft.thread_id)
                .await?
                .map_or(1, |head| head.version + 1);
            let checkpoint = draft.clone().into_checkpoint(version);

            match self.save(checkpoint.clone()).await {
                Ok(()) => return Ok(checkpoint),
                Err(e) if e.is_version_conflict() => {
                    tracing::debug!(
                        thread_id = %draft.thread_id,
                        version,
                        "lost checkpoint version race, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CheckpointError::Storage(format!(
            "could not append to thread '{}' after {} attempts",
            draft.thread_id, MAX_APPEND_ATTEMPTS
        )))
    }
}

/// Reject checkpoints that can never be addressed
pub(crate) fn validate<S>(checkpoint: &Checkpoint<S>) -> Result<()> {
    if checkpoint.thread_id.is_empty() {
        return Err(CheckpointError::Invalid("thread_id is required".to_string()));
    }
    if checkpoint.version == 0 {
        return Err(CheckpointError::Invalid(
            "versions start at 1".to_string(),
        ));
    }
    Ok(())
}

//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointStore`] keeps every thread's log in a
//! `Arc<RwLock<HashMap>>`. Cloning the store shares the same map, so several
//! compiled graphs (or a graph and a test) can observe the same checkpoints.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Arc<RwLock<HashMap<thread_id, Vec<..>>>>     │
//! │                                               │
//! │  "session-1" ─► [v1, v2, v3]                  │
//! │  "session-2" ─► [v1]                          │
//! │                                               │
//! │  • each Vec is kept sorted by version         │
//! │  • append assigns head+1 under the write lock │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Data is lost when the process exits; use
//! [`FileCheckpointStore`](crate::FileCheckpointStore) to survive restarts.

use crate::checkpoint::{Checkpoint, CheckpointDraft};
use crate::error::{CheckpointError, Result};
use crate::traits::{validate, CheckpointStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage<S> = Arc<RwLock<HashMap<String, Vec<Checkpoint<S>>>>>;

/// In-memory checkpoint store
///
/// # Example
///
/// ```rust
/// use flowgraph_checkpoint::{CheckpointDraft, CheckpointStore, InMemoryCheckpointStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryCheckpointStore::<u32>::new();
///
///     let first = store.append(CheckpointDraft::new("thread-1", "count", 1)).await?;
///     let second = store.append(CheckpointDraft::new("thread-1", "count", 2)).await?;
///
///     assert_eq!((first.version, second.version), (1, 2));
///     assert_eq!(store.latest("thread-1").await?.map(|c| c.state), Some(2));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointStore<S> {
    storage: CheckpointStorage<S>,
}

impl<S> InMemoryCheckpointStore<S> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl<S> Default for InMemoryCheckpointStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> CheckpointStore<S> for InMemoryCheckpointStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<()> {
        validate(&checkpoint)?;

        let mut storage = self.storage.write().await;
        if storage
            .values()
            .flatten()
            .any(|existing| existing.id == checkpoint.id)
        {
            return Err(CheckpointError::Invalid(format!(
                "duplicate checkpoint id {}",
                checkpoint.id
            )));
        }

        let entries = storage.entry(checkpoint.thread_id.clone()).or_default();
        match entries.binary_search_by_key(&checkpoint.version, |c| c.version) {
            Ok(_) => Err(CheckpointError::VersionConflict {
                thread_id: checkpoint.thread_id,
                version: checkpoint.version,
            }),
            Err(pos) => {
                entries.insert(pos, checkpoint);
                Ok(())
            }
        }
    }

    async fn load(&self, id: &str) -> Result<Checkpoint<S>> {
        self.storage
            .read()
            .await
            .values()
            .flatten()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(id.to_string()))
    }

    async fn list_by_thread(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>> {
        Ok(self
            .storage
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_by_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>> {
        Ok(self
            .storage
            .read()
            .await
            .get(thread_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn append(&self, draft: CheckpointDraft<S>) -> Result<Checkpoint<S>> {
        if draft.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let mut storage = self.storage.write().await;
        let entries = storage.entry(draft.thread_id.clone()).or_default();
        let version = entries.last().map_or(1, |head| head.version + 1);
        let checkpoint = draft.into_checkpoint(version);
        entries.push(checkpoint.clone());
        Ok(checkpoint)
    }
}

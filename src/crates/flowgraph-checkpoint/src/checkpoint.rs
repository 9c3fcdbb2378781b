//! Checkpoint data model
//!
//! A [`Checkpoint`] is an immutable snapshot of run state taken at a node
//! boundary. Checkpoints form an append-only log per thread, ordered by a
//! monotonically increasing `version`:
//!
//! ```text
//! thread "order-42"
//!   v1  node=validate   source=loop   next=[enrich]
//!   v2  node=enrich     source=loop   next=[score, audit]
//!   v3  node=enrich     source=merge  next=[publish]     (fan-in)
//!   v4  node=review     source=update next=[publish]     (fork of v2)
//! ```
//!
//! The "head" of a thread is simply its highest version. Resuming from an
//! older version appends new checkpoints after the current head; nothing is
//! ever rewritten.
//!
//! Writers that do not assign versions themselves submit a
//! [`CheckpointDraft`] to [`CheckpointStore::append`](crate::CheckpointStore::append),
//! which hands back the stored checkpoint with its version and id filled in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier of a checkpoint
pub type CheckpointId = String;

/// Generate a fresh checkpoint id (`checkpoint_<uuid>`)
pub fn new_checkpoint_id() -> CheckpointId {
    format!("checkpoint_{}", Uuid::new_v4())
}

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Written by the engine after a node completed
    Loop,
    /// Written by the engine after a fan-in merge
    Merge,
    /// Written inside a fan-out branch while sibling branches may still run
    ///
    /// Its `next` covers only that branch, so it is not a recovery point.
    Branch,
    /// Written by an external state update (fork)
    Update,
    /// Written on demand by the caller
    Manual,
}

/// Metadata attached to a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// What produced the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Number of nodes the producing run had executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,

    /// Run that wrote the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Checkpoint this one descends from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CheckpointId>,

    /// Nodes that would execute next when resuming from this checkpoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step counter
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the producing run id
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Set the parent checkpoint id
    pub fn with_parent(mut self, parent_id: Option<CheckpointId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Set the nodes to run next
    pub fn with_next(mut self, next: Vec<String>) -> Self {
        self.next = next;
        self
    }

    /// Add a custom metadata entry
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Immutable snapshot of a run's state at a node boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint<S> {
    /// Unique checkpoint id
    pub id: CheckpointId,
    /// Thread the checkpoint belongs to
    pub thread_id: String,
    /// Node about to execute or just completed
    pub node_name: String,
    /// State snapshot
    pub state: S,
    /// Checkpoint metadata
    pub metadata: CheckpointMetadata,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Position in the thread's log, starting at 1
    pub version: u64,
}

impl<S> Checkpoint<S> {
    /// Create a checkpoint with a fresh id and the current time
    pub fn new(
        thread_id: impl Into<String>,
        node_name: impl Into<String>,
        state: S,
        version: u64,
    ) -> Self {
        Self {
            id: new_checkpoint_id(),
            thread_id: thread_id.into(),
            node_name: node_name.into(),
            state,
            metadata: CheckpointMetadata::default(),
            timestamp: Utc::now(),
            version,
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Nodes recorded as next in the metadata
    pub fn next_nodes(&self) -> &[String] {
        &self.metadata.next
    }
}

/// A checkpoint that has not been assigned a version yet
#[derive(Debug, Clone)]
pub struct CheckpointDraft<S> {
    pub thread_id: String,
    pub node_name: String,
    pub state: S,
    pub metadata: CheckpointMetadata,
}

impl<S> CheckpointDraft<S> {
    /// Create a draft with empty metadata
    pub fn new(thread_id: impl Into<String>, node_name: impl Into<String>, state: S) -> Self {
        Self {
            thread_id: thread_id.into(),
            node_name: node_name.into(),
            state,
            metadata: CheckpointMetadata::default(),
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Stamp the draft with a version, a fresh id and the current time
    pub fn into_checkpoint(self, version: u64) -> Checkpoint<S> {
        Checkpoint::new(self.thread_id, self.node_name, self.state, version)
            .with_metadata(self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_id_format() {
        let id = new_checkpoint_id();
        assert!(id.starts_with("checkpoint_"));
        assert_ne!(id, new_checkpoint_id());
    }

    #[test]
    fn test_metadata_builders() {
        let meta = CheckpointMetadata::new()
            .with_source(CheckpointSource::Merge)
            .with_step(4)
            .with_run_id("run-1")
            .with_parent(Some("checkpoint_a".to_string()))
            .with_next(vec!["publish".to_string()])
            .with_extra("branch", json!(2));

        assert_eq!(meta.source, Some(CheckpointSource::Merge));
        assert_eq!(meta.step, Some(4));
        assert_eq!(meta.run_id.as_deref(), Some("run-1"));
        assert_eq!(meta.parent_id.as_deref(), Some("checkpoint_a"));
        assert_eq!(meta.next, vec!["publish".to_string()]);
        assert_eq!(meta.extra.get("branch"), Some(&json!(2)));
    }

    #[test]
    fn test_metadata_serializes_flat() {
        let meta = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_extra("custom", json!("x"));

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value, json!({"source": "loop", "custom": "x"}));

        let back: CheckpointMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_draft_into_checkpoint() {
        let draft = CheckpointDraft::new("t-1", "A", json!({"n": 1}))
            .with_metadata(CheckpointMetadata::new().with_next(vec!["B".into()]));

        let cp = draft.into_checkpoint(7);
        assert_eq!(cp.version, 7);
        assert_eq!(cp.thread_id, "t-1");
        assert_eq!(cp.node_name, "A");
        assert_eq!(cp.next_nodes(), &["B".to_string()]);
        assert!(cp.id.starts_with("checkpoint_"));
    }
}

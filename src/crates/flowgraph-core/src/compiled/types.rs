//! Result types returned by compiled graphs

use crate::interrupt::Interrupt;
use chrono::{DateTime, Utc};
use flowgraph_checkpoint::{Checkpoint, CheckpointMetadata};
use serde::{Deserialize, Serialize};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every path reached the terminal
    Completed,
    /// The run paused and can be resumed
    Interrupted,
}

/// Outcome of a successful or paused run
///
/// Failures are returned as [`GraphError`](crate::GraphError) instead.
#[derive(Debug, Clone)]
pub struct ExecutionResult<S> {
    /// Final state, or the state at the pause point
    pub state: S,
    /// Whether the run completed or paused
    pub status: RunStatus,
    /// Pause details when `status` is `Interrupted`
    pub interrupt: Option<Interrupt>,
    /// Identifier of this run
    pub run_id: String,
    /// Thread the run's checkpoints were written to
    pub thread_id: Option<String>,
    /// Last checkpoint written by the run
    pub checkpoint_id: Option<String>,
}

impl<S> ExecutionResult<S> {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn is_interrupted(&self) -> bool {
        self.status == RunStatus::Interrupted
    }

    /// Consume the result, keeping only the state
    pub fn into_state(self) -> S {
        self.state
    }
}

/// A checkpoint viewed as a point in a thread's history
#[derive(Debug, Clone)]
pub struct StateSnapshot<S> {
    /// State stored in the checkpoint
    pub values: S,
    /// Nodes that run next when resuming from here
    pub next: Vec<String>,
    pub checkpoint_id: String,
    pub thread_id: String,
    /// Node that completed (or is paused) at this checkpoint
    pub node_name: String,
    /// Position in the thread's history
    pub version: u64,
    pub metadata: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
}

impl<S> From<Checkpoint<S>> for StateSnapshot<S> {
    fn from(checkpoint: Checkpoint<S>) -> Self {
        Self {
            next: checkpoint.metadata.next.clone(),
            values: checkpoint.state,
            checkpoint_id: checkpoint.id,
            thread_id: checkpoint.thread_id,
            node_name: checkpoint.node_name,
            version: checkpoint.version,
            metadata: checkpoint.metadata,
            created_at: checkpoint.timestamp,
        }
    }
}

impl<S> StateSnapshot<S> {
    /// Whether resuming from here would run nothing
    pub fn is_terminal(&self) -> bool {
        self.next.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_checkpoint() {
        let checkpoint = Checkpoint::new("t", "a", 5u32, 3)
            .with_metadata(CheckpointMetadata::new().with_next(vec!["b".to_string()]));
        let id = checkpoint.id.clone();

        let snapshot = StateSnapshot::from(checkpoint);

        assert_eq!(snapshot.values, 5);
        assert_eq!(snapshot.next, vec!["b"]);
        assert_eq!(snapshot.checkpoint_id, id);
        assert_eq!(snapshot.version, 3);
        assert!(!snapshot.is_terminal());
    }

    #[test]
    fn test_result_status() {
        let result = ExecutionResult {
            state: (),
            status: RunStatus::Interrupted,
            interrupt: None,
            run_id: "r".into(),
            thread_id: None,
            checkpoint_id: None,
        };
        assert!(result.is_interrupted());
        assert!(!result.is_completed());
    }
}

//! Checkpoint inspection, time travel and crash recovery
//!
//! A thread's checkpoints form an append-only log ordered by version.
//! Nothing here rewrites history: [`update_state`](CompiledGraph::update_state)
//! appends a new checkpoint whose parent is the one it was derived from, so
//! editing an old checkpoint forks the history instead of overwriting it.
//!
//! ```text
//! v1 (a) ─▶ v2 (b) ─▶ v3 (c)            original run
//!             └────▶ v4 (b, update)      fork from v2
//!                       └─▶ v5 (c) ...   resumed fork
//! ```

use super::graph::CompiledGraph;
use super::types::StateSnapshot;
use crate::config::RunConfig;
use crate::engine;
use crate::error::{GraphError, Result};
use crate::state::State;
use flowgraph_checkpoint::{Checkpoint, CheckpointDraft, CheckpointError, CheckpointMetadata, CheckpointSource};

impl<S: State> CompiledGraph<S> {
    /// Snapshot of a thread at `checkpoint_id`, or at its latest checkpoint
    ///
    /// Returns `None` for a thread without checkpoints.
    pub async fn get_state(&self, thread_id: &str, checkpoint_id: Option<&str>) -> Result<Option<StateSnapshot<S>>> {
        let store = self.store()?;
        let checkpoint = match checkpoint_id {
            Some(id) => {
                let checkpoint = store.load(id).await?;
                if checkpoint.thread_id != thread_id {
                    return Err(CheckpointError::NotFound(format!(
                        "checkpoint '{}' does not belong to thread '{}'",
                        id, thread_id
                    ))
                    .into());
                }
                Some(checkpoint)
            }
            None => store.latest(thread_id).await?,
        };
        Ok(checkpoint.map(StateSnapshot::from))
    }

    /// Every snapshot of a thread, newest first
    pub async fn get_state_history(&self, thread_id: &str) -> Result<Vec<StateSnapshot<S>>> {
        let mut history = self.store()?.list_by_thread(thread_id).await?;
        history.reverse();
        Ok(history.into_iter().map(StateSnapshot::from).collect())
    }

    /// Apply `values` as if `as_node` had produced them
    ///
    /// Merges `values` into the state of `checkpoint_id` (or the thread's
    /// latest checkpoint) through the graph's schema and appends the result
    /// as a new checkpoint with source `update`. Returns the configuration
    /// that resumes from it, running `as_node`'s successors.
    pub async fn update_state(
        &self,
        thread_id: &str,
        checkpoint_id: Option<&str>,
        as_node: &str,
        values: S,
    ) -> Result<RunConfig<S>> {
        let store = self.store()?;
        let base = match checkpoint_id {
            Some(id) => Some(store.load(id).await?),
            None => store.latest(thread_id).await?,
        };

        let state = match &base {
            Some(base) => self.graph.schema.update(&base.state, &values)?,
            None => values,
        };
        let next = self.successors_of(as_node, &state)?;
        let parent = base.map(|b| b.id);

        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Update)
            .with_parent(parent)
            .with_next(next);
        let checkpoint = store
            .append(CheckpointDraft::new(thread_id, as_node, state).with_metadata(metadata))
            .await?;
        tracing::info!(
            thread_id,
            as_node,
            version = checkpoint.version,
            "state updated"
        );

        Ok(RunConfig::for_thread(thread_id).with_checkpoint_id(checkpoint.id))
    }

    /// Write a checkpoint on demand
    ///
    /// `node_name` is recorded as the node that completed; its successors
    /// become the resume point when it is a registered node.
    pub async fn save_checkpoint(&self, thread_id: &str, node_name: &str, state: S) -> Result<Checkpoint<S>> {
        let store = self.store()?;
        let next = if self.graph.contains(node_name) {
            self.successors_of(node_name, &state)?
        } else {
            Vec::new()
        };
        let parent = store.latest(thread_id).await?.map(|c| c.id);
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Manual)
            .with_parent(parent)
            .with_next(next);
        let checkpoint = store
            .append(CheckpointDraft::new(thread_id, node_name, state).with_metadata(metadata))
            .await?;
        Ok(checkpoint)
    }

    /// Delete every checkpoint of a thread
    pub async fn clear_checkpoints(&self, thread_id: &str) -> Result<()> {
        self.store()?.delete_by_thread(thread_id).await?;
        Ok(())
    }

    /// Configuration that recovers a thread after a crash
    ///
    /// `None` means the thread has nothing to recover from and should start
    /// fresh at the entry point. Otherwise the configuration resumes from the
    /// latest loop, merge, update or manual checkpoint at the nodes recorded
    /// in it; an empty resume list means the thread already finished and
    /// resuming returns its final state.
    ///
    /// Checkpoints written inside a fan-out branch are never used: if the
    /// process stopped while branches were running, recovery restarts the
    /// whole fan-out from the checkpoint written before it.
    ///
    /// ```rust
    /// use flowgraph_core::{RunConfig, StateGraph, END};
    /// use flowgraph_checkpoint::InMemoryCheckpointStore;
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> flowgraph_core::Result<()> {
    /// let mut graph = StateGraph::<u32>::new();
    /// graph
    ///     .add_node("a", "", |_ctx, n| async move { Ok(n + 1) })?
    ///     .add_edge("a", END)?
    ///     .set_entry_point("a");
    /// let compiled = graph
    ///     .compile()?
    ///     .with_checkpointer(Arc::new(InMemoryCheckpointStore::<u32>::new()));
    ///
    /// let result = match compiled.recovery_config("job-7").await? {
    ///     Some(config) => compiled.resume(config).await?,
    ///     None => compiled.invoke_with_config(0, RunConfig::for_thread("job-7")).await?,
    /// };
    /// assert_eq!(result.state, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn recovery_config(&self, thread_id: &str) -> Result<Option<RunConfig<S>>> {
        let point = match engine::recovery_point(self, thread_id).await {
            Ok(point) => point,
            Err(GraphError::Checkpoint(CheckpointError::NotFound(_))) => return Ok(None),
            Err(e) => return Err(e),
        };
        tracing::info!(
            thread_id,
            node = %point.node_name,
            version = point.version,
            next = ?point.next_nodes(),
            "recovering thread"
        );
        Ok(Some(
            RunConfig::for_thread(thread_id)
                .with_checkpoint_id(point.id.clone())
                .with_resume_from(point.next_nodes().to_vec()),
        ))
    }
}

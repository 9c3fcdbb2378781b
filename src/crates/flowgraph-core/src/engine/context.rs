//! Per-invocation execution context
//!
//! Everything mutable about a run lives here; the compiled graph itself is
//! shared read-only between runs.

use crate::config::CheckpointConfig;
use crate::error::{GraphError, Result};
use crate::graph::GraphDef;
use crate::interrupt::{InterruptConfig, InterruptWhen};
use crate::listener::{notify, NodeListener};
use crate::node::NodeContext;
use crate::state::State;
use crate::stream::{EventKind, GraphEvent};
use flowgraph_checkpoint::{CheckpointDraft, CheckpointMetadata, CheckpointSource};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) struct RunContext<S: State> {
    pub(crate) graph: Arc<GraphDef<S>>,
    pub(crate) run_id: String,
    pub(crate) thread_id: Option<String>,
    pub(crate) cancel: CancellationToken,
    pub(crate) configurable: Arc<HashMap<String, Value>>,
    pub(crate) interrupts: InterruptConfig,
    /// Nodes the run resumes at that have not executed yet
    pub(crate) resume_pending: Mutex<HashSet<String>>,
    pub(crate) resume_value: Option<Value>,
    pub(crate) listeners: Vec<Arc<dyn NodeListener<S>>>,
    pub(crate) checkpoint: Option<CheckpointConfig<S>>,
    pub(crate) last_checkpoint: Mutex<Option<String>>,
    pub(crate) steps: AtomicUsize,
    pub(crate) recursion_limit: usize,
    pub(crate) cancel_grace: Duration,
}

impl<S: State> RunContext<S> {
    /// Deliver an event to global, node-scoped and run listeners, in that order
    pub(crate) async fn emit(&self, event: GraphEvent<S>) {
        for listener in &self.graph.listeners {
            notify(listener, &event).await;
        }
        if event.kind.is_node_event() {
            if let Some(spec) = self.graph.nodes.get(&event.node_name) {
                for listener in &spec.listeners {
                    notify(listener, &event).await;
                }
            }
        }
        for listener in &self.listeners {
            notify(listener, &event).await;
        }
    }

    pub(crate) fn event(&self, kind: EventKind, node: &str, state: &S) -> GraphEvent<S> {
        GraphEvent::new(kind, node, state.clone(), self.run_id.clone())
    }

    pub(crate) fn node_context(&self, node: &str) -> NodeContext {
        NodeContext::new(
            node,
            self.run_id.clone(),
            self.thread_id.clone(),
            Arc::clone(&self.configurable),
            self.cancel.clone(),
        )
    }

    /// Whether `node` is a resume target running for the first time
    pub(crate) fn take_resume(&self, node: &str) -> bool {
        self.resume_pending.lock().remove(node)
    }

    /// Count one node execution against the recursion limit
    pub(crate) fn next_step(&self) -> Result<usize> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if step > self.recursion_limit {
            return Err(GraphError::RecursionLimit(self.recursion_limit));
        }
        Ok(step)
    }

    pub(crate) fn last_checkpoint_id(&self) -> Option<String> {
        self.last_checkpoint.lock().clone()
    }

    /// Append a checkpoint to the thread, if checkpointing is on
    ///
    /// Store failures are reported and swallowed unless the configuration
    /// makes them fatal.
    pub(crate) async fn persist(
        &self,
        node: &str,
        state: &S,
        source: CheckpointSource,
        next: &[String],
        interrupt: Option<(InterruptWhen, Option<Value>)>,
    ) -> Result<Option<String>> {
        let Some(config) = self.checkpoint.as_ref().filter(|c| c.auto_save) else {
            return Ok(None);
        };
        let Some(thread_id) = &self.thread_id else {
            return Ok(None);
        };

        let mut metadata = CheckpointMetadata::new()
            .with_source(source)
            .with_step(self.steps.load(Ordering::SeqCst) as u64)
            .with_run_id(self.run_id.clone())
            .with_parent(self.last_checkpoint_id())
            .with_next(next.to_vec());
        if let Some((when, value)) = interrupt {
            metadata = metadata.with_extra("interrupt", json!(when.as_str()));
            if let Some(value) = value {
                metadata = metadata.with_extra("interrupt_value", value);
            }
        }
        let draft = CheckpointDraft::new(thread_id.clone(), node, state.clone()).with_metadata(metadata);

        match config.store.append(draft).await {
            Ok(checkpoint) => {
                *self.last_checkpoint.lock() = Some(checkpoint.id.clone());
                tracing::debug!(
                    node,
                    thread_id = %thread_id,
                    version = checkpoint.version,
                    "checkpoint saved"
                );
                let event = self
                    .event(EventKind::CheckpointSaved, node, state)
                    .with_metadata("checkpoint_id", json!(checkpoint.id))
                    .with_metadata("version", json!(checkpoint.version));
                self.emit(event).await;
                Ok(Some(checkpoint.id))
            }
            Err(e) if config.fatal_errors => Err(e.into()),
            Err(e) => {
                tracing::warn!(node, thread_id = %thread_id, error = %e, "failed to save checkpoint");
                let event = self
                    .event(EventKind::CheckpointFailed, node, state)
                    .with_error(e.to_string());
                self.emit(event).await;
                Ok(None)
            }
        }
    }
}

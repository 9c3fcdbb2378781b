//! CompiledGraph struct and configuration methods

use crate::config::{CheckpointConfig, EngineConfig, DEFAULT_CANCEL_GRACE, DEFAULT_RECURSION_LIMIT};
use crate::error::{GraphError, Result};
use crate::graph::{GraphDef, END};
use crate::interrupt::InterruptConfig;
use crate::node::NodeContext;
use crate::state::State;
use crate::stream::DEFAULT_STREAM_BUFFER;
use crate::visualization::{self, VisualizationOptions};
use flowgraph_checkpoint::CheckpointStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// An immutable, runnable graph
///
/// Produced by [`StateGraph::compile`](crate::StateGraph::compile). Cloning
/// is cheap and clones share the frozen graph; runs never mutate it, so one
/// `CompiledGraph` can serve many concurrent invocations.
pub struct CompiledGraph<S: State> {
    pub(crate) graph: Arc<GraphDef<S>>,
    pub(crate) checkpoint: Option<CheckpointConfig<S>>,
    pub(crate) interrupts: InterruptConfig,
    pub(crate) recursion_limit: usize,
    pub(crate) cancel_grace: Duration,
    pub(crate) stream_buffer: usize,
    pub(crate) engine: EngineConfig,
}

impl<S: State> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            checkpoint: self.checkpoint.clone(),
            interrupts: self.interrupts.clone(),
            recursion_limit: self.recursion_limit,
            cancel_grace: self.cancel_grace,
            stream_buffer: self.stream_buffer,
            engine: self.engine.clone(),
        }
    }
}

impl<S: State> fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.graph.order)
            .field("entry", &self.graph.entry)
            .field("checkpoint", &self.checkpoint)
            .field("interrupts", &self.interrupts)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}

impl<S: State> CompiledGraph<S> {
    pub(crate) fn new(graph: GraphDef<S>) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpoint: None,
            interrupts: InterruptConfig::default(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            cancel_grace: DEFAULT_CANCEL_GRACE,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            engine: EngineConfig::default(),
        }
    }

    /// Persist checkpoints to `store`
    ///
    /// Auto-save and fatal-error behavior follow the engine configuration
    /// (auto-save on, failures non-fatal by default).
    pub fn with_checkpointer(mut self, store: Arc<dyn CheckpointStore<S>>) -> Self {
        self.checkpoint = Some(
            CheckpointConfig::new(store)
                .with_auto_save(self.engine.checkpoint_auto_save)
                .with_fatal_errors(self.engine.checkpoint_errors_fatal),
        );
        self
    }

    /// Persist checkpoints with explicit settings
    pub fn with_checkpoint_config(mut self, config: CheckpointConfig<S>) -> Self {
        self.checkpoint = Some(config);
        self
    }

    /// Static interrupt points, added to those from the engine configuration
    pub fn with_interrupt_config(mut self, config: InterruptConfig) -> Self {
        self.interrupts = self
            .interrupts
            .extended(&config.interrupt_before, &config.interrupt_after);
        self.interrupts.interrupt_before_all |= config.interrupt_before_all;
        self.interrupts.interrupt_after_all |= config.interrupt_after_all;
        self
    }

    /// Apply engine-wide settings
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.recursion_limit = config.recursion_limit.max(1);
        self.cancel_grace = config.cancel_grace();
        self.stream_buffer = config.stream_buffer.max(1);
        if let Some(checkpoint) = self.checkpoint.as_mut() {
            checkpoint.auto_save = config.checkpoint_auto_save;
            checkpoint.fatal_errors = config.checkpoint_errors_fatal;
        }
        let interrupts = config.interrupt.clone();
        self.engine = config;
        self.with_interrupt_config(interrupts)
    }

    /// Maximum node executions per run
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    /// How long to wait for branches after cancellation before aborting them
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn interrupt_config(&self) -> &InterruptConfig {
        &self.interrupts
    }

    pub fn checkpoint_config(&self) -> Option<&CheckpointConfig<S>> {
        self.checkpoint.as_ref()
    }

    pub(crate) fn store(&self) -> Result<&Arc<dyn CheckpointStore<S>>> {
        self.checkpoint
            .as_ref()
            .map(|c| &c.store)
            .ok_or_else(|| GraphError::Configuration("no checkpointer configured".to_string()))
    }

    pub(crate) fn graph(&self) -> &GraphDef<S> {
        &self.graph
    }

    /// Node names in registration order
    pub fn node_names(&self) -> &[String] {
        &self.graph.order
    }

    pub fn entry_point(&self) -> &str {
        &self.graph.entry
    }

    /// Description given when the node was registered
    pub fn node_description(&self, node: &str) -> Option<&str> {
        self.graph.nodes.get(node).map(|spec| spec.description.as_str())
    }

    /// Nodes that run after `node` produced `state`, terminal excluded
    ///
    /// Evaluates the node's router when it has one. This is the
    /// `successorOf` query of the crash-recovery pattern.
    pub fn successors_of(&self, node: &str, state: &S) -> Result<Vec<String>> {
        if !self.graph.contains(node) {
            return Err(GraphError::UnknownNode(node.to_string()));
        }
        let ctx = NodeContext::detached(node, None);
        Ok(self
            .graph
            .successors(&ctx, node, state)?
            .into_iter()
            .filter(|n| n != END)
            .collect())
    }

    /// Render the graph as Mermaid, DOT or ASCII
    pub fn visualize(&self, options: &VisualizationOptions) -> String {
        visualization::render(&self.graph, options)
    }
}

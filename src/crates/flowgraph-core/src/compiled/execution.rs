//! Invocation entry points

use super::graph::CompiledGraph;
use super::types::ExecutionResult;
use crate::config::RunConfig;
use crate::engine;
use crate::error::{GraphError, Result};
use crate::state::State;

impl<S: State> CompiledGraph<S> {
    /// Run the graph from its entry point
    ///
    /// Returns the final state, or a paused result when an interrupt fires.
    /// With a checkpointer configured, the run gets a fresh thread id.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flowgraph_core::{StateGraph, END};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> flowgraph_core::Result<()> {
    /// let mut graph = StateGraph::<Vec<&'static str>>::new();
    /// graph
    ///     .add_node("greet", "", |_ctx, mut words| async move {
    ///         words.push("hello");
    ///         Ok(words)
    ///     })?
    ///     .add_edge("greet", END)?
    ///     .set_entry_point("greet");
    ///
    /// let result = graph.compile()?.invoke(vec![]).await?;
    /// assert!(result.is_completed());
    /// assert_eq!(result.state, vec!["hello"]);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn invoke(&self, input: S) -> Result<ExecutionResult<S>> {
        self.invoke_with_config(input, RunConfig::new()).await
    }

    /// Run the graph with per-run configuration
    ///
    /// When `config.checkpoint_id` is set, `input` is ignored and the
    /// checkpoint's state is used instead.
    pub async fn invoke_with_config(&self, input: S, config: RunConfig<S>) -> Result<ExecutionResult<S>> {
        engine::execute(self, input, config).await
    }

    /// Continue a thread from a checkpoint
    ///
    /// Uses `config.checkpoint_id` when set, otherwise the thread's latest
    /// checkpoint written outside a fan-out branch. Execution starts at
    /// `config.resume_from` or at the nodes recorded in the checkpoint.
    pub async fn resume(&self, config: RunConfig<S>) -> Result<ExecutionResult<S>> {
        let thread_id = config
            .thread_id
            .clone()
            .ok_or_else(|| GraphError::Configuration("resume requires a thread_id".to_string()))?;

        let checkpoint = match &config.checkpoint_id {
            Some(id) => self.store()?.load(id).await?,
            None => engine::recovery_point(self, &thread_id).await?,
        };
        tracing::debug!(
            thread_id = %thread_id,
            checkpoint_id = %checkpoint.id,
            version = checkpoint.version,
            "resuming thread"
        );

        let config = config.with_checkpoint_id(checkpoint.id.clone());
        self.invoke_with_config(checkpoint.state, config).await
    }
}

//! Node and router function contracts
//!
//! A node is an opaque async function `(NodeContext, S) -> Result<S, NodeError>`.
//! The engine never looks inside it: it may call an LLM, run a tool, or do
//! pure computation.
//!
//! [`NodeContext`] is the per-invocation context handed to every node and
//! router. It carries the run's cancellation token, identifiers, the
//! caller-supplied `configurable` map, and (when a run resumes a paused node)
//! the resume value.
//!
//! ```rust
//! use flowgraph_core::NodeContext;
//! use std::time::Duration;
//!
//! async fn slow_call(ctx: NodeContext, input: u64) -> Result<u64, flowgraph_core::NodeError> {
//!     tokio::select! {
//!         _ = ctx.cancelled() => Err("cancelled while waiting".into()),
//!         _ = tokio::time::sleep(Duration::from_millis(5)) => Ok(input + 1),
//!     }
//! }
//! ```

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Error type returned by node functions
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by node functions
pub type NodeResult<S> = std::result::Result<S, NodeError>;

/// Boxed node function
pub type NodeFn<S> = Arc<dyn Fn(NodeContext, S) -> BoxFuture<'static, NodeResult<S>> + Send + Sync>;

/// Boxed router function for conditional edges
pub type RouterFn<S> = Arc<dyn Fn(&NodeContext, &S) -> String + Send + Sync>;

/// Context passed to nodes and routers
#[derive(Debug, Clone)]
pub struct NodeContext {
    node: String,
    run_id: String,
    thread_id: Option<String>,
    configurable: Arc<HashMap<String, Value>>,
    cancel: CancellationToken,
    resume_value: Option<Value>,
    resumed: bool,
}

impl NodeContext {
    pub(crate) fn new(
        node: impl Into<String>,
        run_id: impl Into<String>,
        thread_id: Option<String>,
        configurable: Arc<HashMap<String, Value>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node: node.into(),
            run_id: run_id.into(),
            thread_id,
            configurable,
            cancel,
            resume_value: None,
            resumed: false,
        }
    }

    /// Context for evaluating routers outside of a run
    pub(crate) fn detached(node: impl Into<String>, thread_id: Option<String>) -> Self {
        Self::new(
            node,
            String::new(),
            thread_id,
            Arc::new(HashMap::new()),
            CancellationToken::new(),
        )
    }

    pub(crate) fn with_resume_value(mut self, value: Option<Value>) -> Self {
        self.resume_value = value;
        self
    }

    pub(crate) fn as_resumed(mut self) -> Self {
        self.resumed = true;
        self
    }

    /// Name of the node being executed (or whose router is evaluated)
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Identifier of the current run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Thread the run belongs to, if any
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Caller-supplied configuration value
    pub fn config(&self, key: &str) -> Option<&Value> {
        self.configurable.get(key)
    }

    /// Whole caller-supplied configuration map
    pub fn configurable(&self) -> &HashMap<String, Value> {
        &self.configurable
    }

    /// Value supplied by the caller when resuming this node after an interrupt
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume_value.as_ref()
    }

    /// Whether this execution continues the node after a pause
    ///
    /// True on the first execution of a node the run resumed at, with or
    /// without a resume value.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Whether the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Token that fires when the run is cancelled
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_accessors() {
        let mut config = HashMap::new();
        config.insert("model".to_string(), json!("small"));
        let token = CancellationToken::new();

        let ctx = NodeContext::new("plan", "run-1", Some("t-1".into()), Arc::new(config), token.clone())
            .with_resume_value(Some(json!("yes")));

        assert_eq!(ctx.node(), "plan");
        assert_eq!(ctx.run_id(), "run-1");
        assert_eq!(ctx.thread_id(), Some("t-1"));
        assert_eq!(ctx.config("model"), Some(&json!("small")));
        assert_eq!(ctx.resume_value(), Some(&json!("yes")));

        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_detached_context() {
        let ctx = NodeContext::detached("route", None);
        assert_eq!(ctx.node(), "route");
        assert!(ctx.configurable().is_empty());
        assert!(ctx.resume_value().is_none());
        assert!(!ctx.is_resumed());
        assert!(ctx.as_resumed().is_resumed());
    }
}

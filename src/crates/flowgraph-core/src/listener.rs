//! Listeners observing execution events
//!
//! Listeners attach at three scopes:
//!
//! | Scope | Registered with | Receives |
//! |-------|-----------------|----------|
//! | Global | [`StateGraph::add_listener`](crate::StateGraph::add_listener) | every event of every run |
//! | Node | [`StateGraph::add_node_listener`](crate::StateGraph::add_node_listener) | that node's start/complete/error events |
//! | Run | [`RunConfig::with_listener`](crate::RunConfig::with_listener) | every event of one run |
//!
//! The engine awaits each listener before moving on, so a slow listener
//! slows the run down. Failures are contained: an error or panic inside a
//! listener is logged with `tracing::warn!` and the run continues.
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::{EventKind, FnListener, GraphEvent};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let completed = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&completed);
//! let listener = FnListener::new(move |event: &GraphEvent<u32>| {
//!     if event.kind == EventKind::NodeComplete {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }
//! });
//! # let _ = listener;
//! ```

use crate::state::State;
use crate::stream::{EventKind, GraphEvent};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Error type returned by listeners
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Observer of execution events
#[async_trait]
pub trait NodeListener<S: State>: Send + Sync {
    /// Handle one event
    async fn on_event(&self, event: &GraphEvent<S>) -> Result<(), ListenerError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "listener"
    }
}

/// Invoke a listener, containing errors and panics
pub(crate) async fn notify<S: State>(listener: &Arc<dyn NodeListener<S>>, event: &GraphEvent<S>) {
    match AssertUnwindSafe(listener.on_event(event)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(
                listener = listener.name(),
                node = %event.node_name,
                error = %e,
                "listener failed"
            );
        }
        Err(_) => {
            tracing::warn!(
                listener = listener.name(),
                node = %event.node_name,
                "listener panicked"
            );
        }
    }
}

type EventFn<S> = dyn Fn(&GraphEvent<S>) + Send + Sync;

/// Listener backed by a synchronous closure
pub struct FnListener<S> {
    f: Box<EventFn<S>>,
}

impl<S> FnListener<S> {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&GraphEvent<S>) + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

impl<S> fmt::Debug for FnListener<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").field("f", &"<function>").finish()
    }
}

#[async_trait]
impl<S: State> NodeListener<S> for FnListener<S> {
    async fn on_event(&self, event: &GraphEvent<S>) -> Result<(), ListenerError> {
        (self.f)(event);
        Ok(())
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Listener that reports events through `tracing`
#[derive(Debug, Clone, Default)]
pub struct LoggingListener {
    include_checkpoints: bool,
}

impl LoggingListener {
    /// Log node, chain and interrupt events
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log checkpoint events
    pub fn with_checkpoints(mut self) -> Self {
        self.include_checkpoints = true;
        self
    }
}

#[async_trait]
impl<S: State> NodeListener<S> for LoggingListener {
    async fn on_event(&self, event: &GraphEvent<S>) -> Result<(), ListenerError> {
        let node = event.node_name.as_str();
        let run_id = event.run_id.as_str();
        match event.kind {
            EventKind::ChainStart => tracing::info!(run_id, "run started"),
            EventKind::ChainEnd => match &event.error {
                Some(error) => tracing::error!(run_id, error = %error, "run failed"),
                None => tracing::info!(run_id, "run finished"),
            },
            EventKind::NodeStart => tracing::info!(run_id, node, "node started"),
            EventKind::NodeComplete => tracing::info!(
                run_id,
                node,
                duration_ms = event.duration.map(|d| d.as_millis() as u64),
                "node completed"
            ),
            EventKind::NodeError => tracing::error!(
                run_id,
                node,
                error = event.error.as_deref().unwrap_or("unknown"),
                "node failed"
            ),
            EventKind::Interrupted => tracing::info!(run_id, node, "run interrupted"),
            EventKind::CheckpointSaved if self.include_checkpoints => {
                tracing::debug!(run_id, node, "checkpoint saved")
            }
            EventKind::CheckpointFailed if self.include_checkpoints => tracing::warn!(
                run_id,
                node,
                error = event.error.as_deref().unwrap_or("unknown"),
                "checkpoint failed"
            ),
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[derive(Debug, Default)]
struct Metrics {
    executions: HashMap<String, usize>,
    errors: HashMap<String, usize>,
    durations: HashMap<String, Vec<Duration>>,
    total_executions: usize,
}

/// Listener collecting per-node execution counts, errors and durations
///
/// Cloning shares the underlying counters.
///
/// ```rust
/// use flowgraph_core::{EventKind, GraphEvent, MetricsListener, NodeListener};
///
/// # tokio_test_block(async {
/// let metrics = MetricsListener::new();
/// metrics.on_event(&GraphEvent::new(EventKind::NodeStart, "a", (), "r")).await.unwrap();
/// assert_eq!(metrics.total_executions(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsListener {
    inner: Arc<Mutex<Metrics>>,
}

impl MetricsListener {
    /// Create an empty metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times each node started
    pub fn node_executions(&self) -> HashMap<String, usize> {
        self.inner.lock().executions.clone()
    }

    /// Number of failures per node
    pub fn node_errors(&self) -> HashMap<String, usize> {
        self.inner.lock().errors.clone()
    }

    /// Average completed duration per node
    pub fn average_durations(&self) -> HashMap<String, Duration> {
        self.inner
            .lock()
            .durations
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(node, samples)| {
                let total: Duration = samples.iter().sum();
                (node.clone(), total / samples.len() as u32)
            })
            .collect()
    }

    /// Total node executions across all nodes
    pub fn total_executions(&self) -> usize {
        self.inner.lock().total_executions
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let metrics = self.inner.lock();
        let mut out = String::new();
        let _ = writeln!(out, "=== Node Execution Metrics ===");
        let _ = writeln!(out, "Total Executions: {}", metrics.total_executions);

        let mut nodes: Vec<_> = metrics.executions.iter().collect();
        nodes.sort();
        let _ = writeln!(out, "Executions:");
        for (node, count) in nodes {
            let _ = writeln!(out, "  {}: {}", node, count);
        }

        if !metrics.errors.is_empty() {
            let mut errors: Vec<_> = metrics.errors.iter().collect();
            errors.sort();
            let _ = writeln!(out, "Errors:");
            for (node, count) in errors {
                let _ = writeln!(out, "  {}: {} errors", node, count);
            }
        }
        out
    }

    /// Forget everything collected so far
    pub fn reset(&self) {
        *self.inner.lock() = Metrics::default();
    }
}

#[async_trait]
impl<S: State> NodeListener<S> for MetricsListener {
    async fn on_event(&self, event: &GraphEvent<S>) -> Result<(), ListenerError> {
        let mut metrics = self.inner.lock();
        let node = event.node_name.clone();
        match event.kind {
            EventKind::NodeStart => {
                *metrics.executions.entry(node).or_default() += 1;
                metrics.total_executions += 1;
            }
            EventKind::NodeComplete => {
                if let Some(duration) = event.duration {
                    metrics.durations.entry(node).or_default().push(duration);
                }
            }
            EventKind::NodeError => {
                *metrics.errors.entry(node).or_default() += 1;
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(kind: EventKind, node: &str) -> GraphEvent<()> {
        GraphEvent::new(kind, node, (), "run")
    }

    struct FailingListener;

    #[async_trait]
    impl NodeListener<()> for FailingListener {
        async fn on_event(&self, _event: &GraphEvent<()>) -> Result<(), ListenerError> {
            Err("listener broke".into())
        }
    }

    struct PanickingListener;

    #[async_trait]
    impl NodeListener<()> for PanickingListener {
        async fn on_event(&self, _event: &GraphEvent<()>) -> Result<(), ListenerError> {
            panic!("listener exploded");
        }
    }

    #[tokio::test]
    async fn test_notify_contains_failures() {
        let failing: Arc<dyn NodeListener<()>> = Arc::new(FailingListener);
        let panicking: Arc<dyn NodeListener<()>> = Arc::new(PanickingListener);

        notify(&failing, &event(EventKind::NodeStart, "a")).await;
        notify(&panicking, &event(EventKind::NodeStart, "a")).await;
    }

    #[tokio::test]
    async fn test_fn_listener() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let listener: Arc<dyn NodeListener<()>> = Arc::new(FnListener::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        notify(&listener, &event(EventKind::NodeComplete, "a")).await;
        notify(&listener, &event(EventKind::ChainEnd, "__end__")).await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_metrics_counts() {
        let metrics = MetricsListener::new();
        let complete = event(EventKind::NodeComplete, "node1").with_duration(Duration::from_millis(4));

        metrics.on_event(&event(EventKind::NodeStart, "node1")).await.unwrap();
        metrics.on_event(&complete).await.unwrap();
        metrics.on_event(&event(EventKind::NodeStart, "node2")).await.unwrap();
        metrics.on_event(&event(EventKind::NodeError, "node2")).await.unwrap();

        assert_eq!(metrics.node_executions()["node1"], 1);
        assert_eq!(metrics.node_errors()["node2"], 1);
        assert_eq!(metrics.total_executions(), 2);
        assert_eq!(metrics.average_durations()["node1"], Duration::from_millis(4));

        let summary = metrics.summary();
        assert!(summary.contains("Node Execution Metrics"));
        assert!(summary.contains("Total Executions: 2"));
        assert!(summary.contains("node1: 1"));
        assert!(summary.contains("node2: 1 errors"));
    }

    #[tokio::test]
    async fn test_metrics_reset() {
        let metrics = MetricsListener::new();
        metrics.on_event(&event(EventKind::NodeStart, "a")).await.unwrap();
        assert_eq!(metrics.total_executions(), 1);

        metrics.reset();

        assert_eq!(metrics.total_executions(), 0);
        assert!(metrics.node_executions().is_empty());
    }

    #[tokio::test]
    async fn test_logging_listener_never_fails() {
        let listener = LoggingListener::new().with_checkpoints();
        for kind in [
            EventKind::ChainStart,
            EventKind::NodeStart,
            EventKind::NodeComplete,
            EventKind::NodeError,
            EventKind::CheckpointFailed,
            EventKind::ChainEnd,
        ] {
            listener.on_event(&event(kind, "n")).await.unwrap();
        }
    }
}

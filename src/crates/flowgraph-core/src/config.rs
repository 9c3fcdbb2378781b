//! Run, checkpoint and engine configuration
//!
//! | Type | Scope | Serializable |
//! |------|-------|--------------|
//! | [`RunConfig`] | one invocation | no (carries listeners and a token) |
//! | [`CheckpointConfig`] | compiled graph | no (carries the store) |
//! | [`EngineConfig`] | compiled graph | yes, YAML or JSON |
//!
//! # Loading Engine Settings
//!
//! ```rust
//! use flowgraph_core::EngineConfig;
//!
//! let config = EngineConfig::from_yaml_str(
//!     r#"
//! recursion_limit: 25
//! cancel_grace_ms: 50
//! interrupt:
//!   interrupt_before: [review]
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.recursion_limit, 25);
//! assert!(config.interrupt.should_interrupt_before("review"));
//! assert!(config.checkpoint_auto_save);
//! ```

use crate::error::{GraphError, Result};
use crate::interrupt::InterruptConfig;
use crate::listener::NodeListener;
use crate::state::State;
use crate::stream::DEFAULT_STREAM_BUFFER;
use flowgraph_checkpoint::CheckpointStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default maximum number of node executions per run
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Default time to wait for branch tasks after cancellation
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(100);

/// Per-invocation configuration
///
/// A default `RunConfig` starts a fresh run at the entry point. Setting
/// `checkpoint_id` loads that checkpoint's state; `resume_from` overrides
/// where execution begins.
///
/// ```rust
/// use flowgraph_core::RunConfig;
/// use std::time::Duration;
///
/// let config: RunConfig<serde_json::Value> = RunConfig::new()
///     .with_thread_id("order-42")
///     .with_resume_from(["ship"])
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(config.thread_id.as_deref(), Some("order-42"));
/// ```
pub struct RunConfig<S: State> {
    /// Thread grouping the run's checkpoints
    pub thread_id: Option<String>,
    /// Checkpoint whose state the run starts from
    pub checkpoint_id: Option<String>,
    /// Nodes to start at instead of the entry point
    pub resume_from: Option<Vec<String>>,
    /// Value returned by [`interrupt`](crate::interrupt()) inside the resumed nodes
    pub resume_value: Option<Value>,
    /// Extra nodes to pause before, for this run only
    pub interrupt_before: Vec<String>,
    /// Extra nodes to pause after, for this run only
    pub interrupt_after: Vec<String>,
    /// Values exposed to nodes through [`NodeContext::config`](crate::NodeContext::config)
    pub configurable: HashMap<String, Value>,
    /// Wall-clock limit for the whole run
    pub timeout: Option<Duration>,
    /// Overrides the graph's recursion limit
    pub recursion_limit: Option<usize>,
    /// Listeners receiving every event of this run
    pub listeners: Vec<Arc<dyn NodeListener<S>>>,
    /// Cancels the run when triggered
    pub cancel: Option<CancellationToken>,
}

impl<S: State> Default for RunConfig<S> {
    fn default() -> Self {
        Self {
            thread_id: None,
            checkpoint_id: None,
            resume_from: None,
            resume_value: None,
            interrupt_before: Vec::new(),
            interrupt_after: Vec::new(),
            configurable: HashMap::new(),
            timeout: None,
            recursion_limit: None,
            listeners: Vec::new(),
            cancel: None,
        }
    }
}

impl<S: State> Clone for RunConfig<S> {
    fn clone(&self) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            checkpoint_id: self.checkpoint_id.clone(),
            resume_from: self.resume_from.clone(),
            resume_value: self.resume_value.clone(),
            interrupt_before: self.interrupt_before.clone(),
            interrupt_after: self.interrupt_after.clone(),
            configurable: self.configurable.clone(),
            timeout: self.timeout,
            recursion_limit: self.recursion_limit,
            listeners: self.listeners.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: State> fmt::Debug for RunConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("thread_id", &self.thread_id)
            .field("checkpoint_id", &self.checkpoint_id)
            .field("resume_from", &self.resume_from)
            .field("resume_value", &self.resume_value)
            .field("interrupt_before", &self.interrupt_before)
            .field("interrupt_after", &self.interrupt_after)
            .field("configurable", &self.configurable)
            .field("timeout", &self.timeout)
            .field("recursion_limit", &self.recursion_limit)
            .field("listeners", &self.listeners.len())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl<S: State> RunConfig<S> {
    /// Configuration for a fresh run
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a run on `thread_id`
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self::new().with_thread_id(thread_id)
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn with_resume_from<I, T>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.resume_from = Some(nodes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_resume_value(mut self, value: Value) -> Self {
        self.resume_value = Some(value);
        self
    }

    pub fn with_interrupt_before<I, T>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.interrupt_before = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interrupt_after<I, T>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.interrupt_after = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Add one entry to the configurable map
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configurable.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    /// Add a listener for this run only
    pub fn with_listener(mut self, listener: Arc<dyn NodeListener<S>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Cancel the run when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether the run continues from an earlier position
    pub fn is_resume(&self) -> bool {
        self.checkpoint_id.is_some() || self.resume_from.is_some()
    }
}

/// Checkpoint persistence settings of a compiled graph
pub struct CheckpointConfig<S> {
    /// Where checkpoints go
    pub store: Arc<dyn CheckpointStore<S>>,
    /// Persist after every node and merge
    pub auto_save: bool,
    /// Fail the run when persisting fails
    pub fatal_errors: bool,
}

impl<S> Clone for CheckpointConfig<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            auto_save: self.auto_save,
            fatal_errors: self.fatal_errors,
        }
    }
}

impl<S> fmt::Debug for CheckpointConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointConfig")
            .field("store", &"<store>")
            .field("auto_save", &self.auto_save)
            .field("fatal_errors", &self.fatal_errors)
            .finish()
    }
}

impl<S: State> CheckpointConfig<S> {
    /// Auto-saving, non-fatal configuration
    pub fn new(store: Arc<dyn CheckpointStore<S>>) -> Self {
        Self {
            store,
            auto_save: true,
            fatal_errors: false,
        }
    }

    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    pub fn with_fatal_errors(mut self, fatal: bool) -> Self {
        self.fatal_errors = fatal;
        self
    }
}

/// Engine-wide settings, loadable from YAML or JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum node executions per run
    pub recursion_limit: usize,
    /// Milliseconds to wait for branch tasks after cancellation
    pub cancel_grace_ms: u64,
    /// Capacity of the stream channel
    pub stream_buffer: usize,
    /// Persist checkpoints after every node
    pub checkpoint_auto_save: bool,
    /// Fail runs when persisting fails
    pub checkpoint_errors_fatal: bool,
    /// Static interrupt points
    pub interrupt: InterruptConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE.as_millis() as u64,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            checkpoint_auto_save: true,
            checkpoint_errors_fatal: false,
            interrupt: InterruptConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Configuration(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.recursion_limit == 0 {
            return Err(GraphError::Configuration(
                "recursion_limit must be at least 1".to_string(),
            ));
        }
        if self.stream_buffer == 0 {
            return Err(GraphError::Configuration(
                "stream_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_checkpoint::InMemoryCheckpointStore;
    use serde_json::json;

    #[test]
    fn test_run_config_builders() {
        let config: RunConfig<Value> = RunConfig::for_thread("t")
            .with_checkpoint_id("checkpoint_1")
            .with_resume_from(["b", "c"])
            .with_resume_value(json!(true))
            .with_config("user", json!("ada"))
            .with_recursion_limit(5);

        assert!(config.is_resume());
        assert_eq!(config.resume_from, Some(vec!["b".to_string(), "c".to_string()]));
        assert_eq!(config.configurable["user"], json!("ada"));
        assert_eq!(config.recursion_limit, Some(5));
        assert!(!RunConfig::<Value>::new().is_resume());
    }

    #[test]
    fn test_checkpoint_config_defaults() {
        let store: Arc<dyn CheckpointStore<Value>> = Arc::new(InMemoryCheckpointStore::new());
        let config = CheckpointConfig::new(store);

        assert!(config.auto_save);
        assert!(!config.fatal_errors);
        assert!(config.with_fatal_errors(true).fatal_errors);
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.recursion_limit, DEFAULT_RECURSION_LIMIT);
        assert_eq!(config.cancel_grace(), DEFAULT_CANCEL_GRACE);
        assert_eq!(config.stream_buffer, DEFAULT_STREAM_BUFFER);
    }

    #[test]
    fn test_engine_config_json() {
        let config = EngineConfig::from_json_str(r#"{"checkpoint_errors_fatal": true}"#).unwrap();
        assert!(config.checkpoint_errors_fatal);
        assert_eq!(config.recursion_limit, DEFAULT_RECURSION_LIMIT);
    }

    #[test]
    fn test_engine_config_rejects_zero_limit() {
        let err = EngineConfig::from_yaml_str("recursion_limit: 0").unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[test]
    fn test_engine_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "stream_buffer: 8\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.stream_buffer, 8);
    }
}

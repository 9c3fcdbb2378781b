//! Human-in-the-loop interrupts
//!
//! A run can pause in two ways:
//!
//! - **Static interrupts**: an [`InterruptConfig`] (set on the compiled graph
//!   or per run through [`RunConfig`]) names nodes to pause before or after.
//! - **Dynamic interrupts**: a node calls [`interrupt`] with a payload for the
//!   human. The run pauses *before* that node; when it is resumed with a
//!   value, the node runs again from the top and `interrupt` returns the
//!   value instead of pausing.
//!
//! A paused run returns `Ok(ExecutionResult)` with status `Interrupted` and an
//! [`Interrupt`] describing where it stopped. [`Interrupt::resume_config`]
//! builds the [`RunConfig`] that continues the run.
//!
//! ```text
//! invoke ─▶ a ─▶ [pause before b] ─▶ Interrupt{node: b, next: [b]}
//!                                        │
//!      caller inspects / edits state ◀───┘
//!                                        │
//! resume(interrupt.resume_config()) ─▶ b ─▶ c ─▶ END
//! ```
//!
//! # Dynamic Interrupt
//!
//! ```rust
//! use flowgraph_core::{interrupt, NodeContext, NodeError};
//! use serde_json::{json, Value};
//!
//! async fn approve(ctx: NodeContext, mut state: Value) -> Result<Value, NodeError> {
//!     let answer = interrupt(&ctx, json!({"question": "ship it?"}))?;
//!     state["approved"] = answer;
//!     Ok(state)
//! }
//! ```

use crate::config::RunConfig;
use crate::node::{NodeContext, NodeError};
use crate::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Static interrupt points
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// Nodes to pause before
    pub interrupt_before: Vec<String>,

    /// Nodes to pause after
    pub interrupt_after: Vec<String>,

    /// Pause before every node
    pub interrupt_before_all: bool,

    /// Pause after every node
    pub interrupt_after_all: bool,
}

impl InterruptConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set nodes to pause before
    pub fn with_interrupt_before<I, T>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.interrupt_before = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Set nodes to pause after
    pub fn with_interrupt_after<I, T>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.interrupt_after = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Pause before every node
    pub fn with_interrupt_before_all(mut self) -> Self {
        self.interrupt_before_all = true;
        self
    }

    /// Pause after every node
    pub fn with_interrupt_after_all(mut self) -> Self {
        self.interrupt_after_all = true;
        self
    }

    /// Whether to pause before `node`
    pub fn should_interrupt_before(&self, node: &str) -> bool {
        self.interrupt_before_all || self.interrupt_before.iter().any(|n| n == node)
    }

    /// Whether to pause after `node`
    pub fn should_interrupt_after(&self, node: &str) -> bool {
        self.interrupt_after_all || self.interrupt_after.iter().any(|n| n == node)
    }

    /// Whether any interrupt point is configured
    pub fn is_empty(&self) -> bool {
        !self.interrupt_before_all
            && !self.interrupt_after_all
            && self.interrupt_before.is_empty()
            && self.interrupt_after.is_empty()
    }

    /// Union with per-run interrupt lists
    pub(crate) fn extended(&self, before: &[String], after: &[String]) -> Self {
        let mut merged = self.clone();
        for node in before {
            if !merged.interrupt_before.contains(node) {
                merged.interrupt_before.push(node.clone());
            }
        }
        for node in after {
            if !merged.interrupt_after.contains(node) {
                merged.interrupt_after.push(node.clone());
            }
        }
        merged
    }
}

/// Whether a run paused before or after its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptWhen {
    /// The node has not run yet
    Before,
    /// The node ran and its output was merged
    After,
}

impl InterruptWhen {
    /// Lowercase name, as stored in checkpoint metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptWhen::Before => "before",
            InterruptWhen::After => "after",
        }
    }
}

/// Where to pick a paused run up again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    /// Thread holding the run's checkpoints (absent without checkpointing)
    pub thread_id: Option<String>,
    /// Node the run paused at
    pub node: String,
}

/// Description of a paused run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Unique id of this pause
    pub interrupt_id: String,
    /// Thread of the run, if it had one
    pub thread_id: Option<String>,
    /// Node the run paused at
    pub node: String,
    /// Before or after `node`
    pub when: InterruptWhen,
    /// Nodes that run first when the run resumes
    pub next: Vec<String>,
    /// Payload passed to [`interrupt`], for dynamic interrupts
    pub value: Option<Value>,
    /// Checkpoint written at the pause point
    pub checkpoint_id: Option<String>,
    /// When the run paused
    pub timestamp: DateTime<Utc>,
}

impl Interrupt {
    pub(crate) fn new(
        thread_id: Option<String>,
        node: impl Into<String>,
        when: InterruptWhen,
        next: Vec<String>,
        value: Option<Value>,
        checkpoint_id: Option<String>,
    ) -> Self {
        Self {
            interrupt_id: Uuid::new_v4().to_string(),
            thread_id,
            node: node.into(),
            when,
            next,
            value,
            checkpoint_id,
            timestamp: Utc::now(),
        }
    }

    /// Token identifying the pause point
    pub fn resume_token(&self) -> ResumeToken {
        ResumeToken {
            thread_id: self.thread_id.clone(),
            node: self.node.clone(),
        }
    }

    /// Run configuration continuing from this pause
    ///
    /// Points at the pause checkpoint when one was written, and starts at
    /// [`next`](Self::next). Without checkpointing, pass the interrupted
    /// result's state as the input state.
    pub fn resume_config<S: State>(&self) -> RunConfig<S> {
        let mut config = RunConfig::new().with_resume_from(self.next.clone());
        if let Some(thread_id) = &self.thread_id {
            config = config.with_thread_id(thread_id.clone());
        }
        if let Some(checkpoint_id) = &self.checkpoint_id {
            config = config.with_checkpoint_id(checkpoint_id.clone());
        }
        config
    }
}

/// Error a node returns to request a pause
///
/// Produced by [`interrupt`]; the engine recognises it and pauses instead of
/// failing the run.
#[derive(Debug, Clone, Error)]
#[error("Node requested an interrupt")]
pub struct NodeInterrupt {
    /// Payload for the human
    pub value: Value,
}

/// Pause the run for human input, or return the input once supplied
///
/// Returns the resume value when the run was resumed with one; otherwise
/// returns a [`NodeInterrupt`] error that the node should propagate with `?`.
pub fn interrupt(ctx: &NodeContext, value: Value) -> Result<Value, NodeError> {
    match ctx.resume_value() {
        Some(resume) => Ok(resume.clone()),
        None => Err(Box::new(NodeInterrupt { value })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn context(resume: Option<Value>) -> NodeContext {
        NodeContext::new("review", "run", None, Arc::new(HashMap::new()), CancellationToken::new())
            .with_resume_value(resume)
    }

    #[test]
    fn test_interrupt_config() {
        let config = InterruptConfig::new()
            .with_interrupt_before(["a"])
            .with_interrupt_after(vec!["b".to_string()]);

        assert!(config.should_interrupt_before("a"));
        assert!(!config.should_interrupt_before("b"));
        assert!(config.should_interrupt_after("b"));
        assert!(!config.is_empty());
        assert!(InterruptConfig::new().with_interrupt_after_all().should_interrupt_after("zzz"));
    }

    #[test]
    fn test_extended_deduplicates() {
        let config = InterruptConfig::new().with_interrupt_before(["a"]);
        let merged = config.extended(&["a".to_string(), "b".to_string()], &["c".to_string()]);

        assert_eq!(merged.interrupt_before, vec!["a", "b"]);
        assert_eq!(merged.interrupt_after, vec!["c"]);
    }

    #[test]
    fn test_interrupt_without_resume_value_pauses() {
        let err = interrupt(&context(None), json!("approve?")).unwrap_err();
        let pause = err.downcast_ref::<NodeInterrupt>().unwrap();
        assert_eq!(pause.value, json!("approve?"));
    }

    #[test]
    fn test_interrupt_with_resume_value_returns_it() {
        let answer = interrupt(&context(Some(json!("yes"))), json!("approve?")).unwrap();
        assert_eq!(answer, json!("yes"));
    }

    #[test]
    fn test_resume_config() {
        let pause = Interrupt::new(
            Some("t-1".into()),
            "b",
            InterruptWhen::Before,
            vec!["b".into()],
            None,
            Some("checkpoint_1".into()),
        );
        let config: RunConfig<u32> = pause.resume_config();

        assert_eq!(config.thread_id.as_deref(), Some("t-1"));
        assert_eq!(config.checkpoint_id.as_deref(), Some("checkpoint_1"));
        assert_eq!(config.resume_from, Some(vec!["b".to_string()]));
        assert_eq!(pause.resume_token().node, "b");
    }

    #[test]
    fn test_interrupt_config_yaml() {
        let config: InterruptConfig = serde_yaml::from_str("interrupt_before: [review]\n").unwrap();
        assert_eq!(config.interrupt_before, vec!["review"]);
        assert!(!config.interrupt_after_all);
    }
}

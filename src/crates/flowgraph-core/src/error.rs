//! Error types for graph definition, compilation and execution
//!
//! Every fallible operation in this crate returns [`GraphError`]. The
//! variants fall into a few families:
//!
//! ```text
//! GraphError
//! ├── Definition (raised by StateGraph / compile, never retried)
//! │   ├── DuplicateNode
//! │   ├── UnknownNode
//! │   ├── NoEntryPoint
//! │   ├── UnreachableNode
//! │   ├── MissingEdge
//! │   ├── AmbiguousEdge
//! │   ├── TerminalUnreachable
//! │   └── ConcurrentWriteConflict
//! ├── Execution
//! │   ├── NodeExecution     - a node function returned an error
//! │   ├── InvalidRoute      - a router picked a target that does not exist
//! │   ├── RecursionLimit    - too many node executions in one run
//! │   └── Execution         - branch task failures
//! ├── Stopped
//! │   ├── Cancelled         - the caller's token was cancelled
//! │   └── DeadlineExceeded  - RunConfig timeout elapsed
//! ├── State                 - a reducer rejected an update
//! ├── Checkpoint            - persistence failures (fatal mode only)
//! ├── Configuration
//! └── Serialization
//! ```
//!
//! Interrupts are **not** errors: a paused run returns `Ok` with an
//! [`ExecutionResult`](crate::ExecutionResult) whose status is
//! `Interrupted`.
//!
//! # Matching Specific Errors
//!
//! ```rust
//! use flowgraph_core::GraphError;
//!
//! fn describe(err: &GraphError) -> &'static str {
//!     match err {
//!         e if e.is_definition_error() => "fix the graph",
//!         e if e.is_cancellation() => "stopped on request",
//!         GraphError::NodeExecution { .. } => "a node failed",
//!         _ => "other failure",
//!     }
//! }
//!
//! assert_eq!(describe(&GraphError::NoEntryPoint), "fix the graph");
//! assert_eq!(describe(&GraphError::Cancelled), "stopped on request");
//! ```

use crate::node::NodeError;
use crate::state::StateError;
use flowgraph_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building, compiling or running a graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node with this name is already registered
    #[error("Node '{0}' is already registered")]
    DuplicateNode(String),

    /// A referenced node is not registered
    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    /// `compile()` was called without an entry point
    #[error("No entry point set")]
    NoEntryPoint,

    /// A registered node cannot be reached from the entry point
    #[error("Node '{0}' is unreachable from the entry point")]
    UnreachableNode(String),

    /// A node has no outgoing edge
    #[error("Node '{0}' has no outgoing edge")]
    MissingEdge(String),

    /// A node has both static and conditional edges, or several routers
    #[error("Node '{0}' has ambiguous outgoing edges")]
    AmbiguousEdge(String),

    /// No path from the entry point reaches the terminal
    #[error("The terminal node is unreachable from the entry point")]
    TerminalUnreachable,

    /// Two branches of one fan-out declare writes to a field with no reducer
    #[error("Field '{field}' is written concurrently by {nodes:?} without a reducer")]
    ConcurrentWriteConflict { field: String, nodes: Vec<String> },

    /// A router returned a target that is not allowed
    #[error("Router of '{from}' returned invalid target '{target}'")]
    InvalidRoute { from: String, target: String },

    /// A node function failed
    #[error("Node '{node}' failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: NodeError,
    },

    /// The run was cancelled through its cancellation token
    #[error("Execution cancelled")]
    Cancelled,

    /// The run exceeded its configured timeout
    #[error("Execution deadline exceeded")]
    DeadlineExceeded,

    /// The run executed more nodes than allowed
    #[error("Recursion limit of {0} node executions reached")]
    RecursionLimit(usize),

    /// General execution failure
    #[error("Execution error: {0}")]
    Execution(String),

    /// A reducer rejected an update
    #[error(transparent)]
    State(#[from] StateError),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration or state (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// Wrap a node function error
    pub fn node_execution(node: impl Into<String>, source: NodeError) -> Self {
        Self::NodeExecution {
            node: node.into(),
            source,
        }
    }

    /// Whether the error was raised by the builder or compiler
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNode(_)
                | Self::UnknownNode(_)
                | Self::NoEntryPoint
                | Self::UnreachableNode(_)
                | Self::MissingEdge(_)
                | Self::AmbiguousEdge(_)
                | Self::TerminalUnreachable
                | Self::ConcurrentWriteConflict { .. }
        )
    }

    /// Whether the run stopped because the caller asked it to
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for GraphError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

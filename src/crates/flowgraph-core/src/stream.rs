//! Execution events and streaming configuration
//!
//! Every step of a run produces [`GraphEvent`]s. Listeners observe them as
//! they happen; [`CompiledGraph::stream`](crate::CompiledGraph::stream)
//! exposes them as an async [`Stream`](futures::Stream).
//!
//! # Event Sequence
//!
//! ```text
//! ChainStart
//!   NodeStart(a) ── NodeComplete(a) ── [CheckpointSaved]
//!   NodeStart(b) ── NodeError(b)
//! ChainEnd (error set)                       <- failed run
//!
//! ChainStart
//!   NodeStart(a) ── NodeComplete(a)
//!   Interrupted(b)
//! ChainEnd                                   <- paused run
//! ```
//!
//! Events of concurrent branches interleave in completion order; within one
//! branch they follow graph order.

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

/// Kind of an execution event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A node is about to run
    NodeStart,
    /// A node finished and its output was merged
    NodeComplete,
    /// A node failed
    NodeError,
    /// A run started
    ChainStart,
    /// A run ended (completed, failed, or paused)
    ChainEnd,
    /// A run paused at an interrupt
    Interrupted,
    /// A checkpoint was persisted
    CheckpointSaved,
    /// Persisting a checkpoint failed (non-fatal)
    CheckpointFailed,
}

impl EventKind {
    /// Whether the event belongs to a single node
    pub fn is_node_event(&self) -> bool {
        matches!(
            self,
            EventKind::NodeStart | EventKind::NodeComplete | EventKind::NodeError
        )
    }
}

/// An execution event
#[derive(Debug, Clone)]
pub struct GraphEvent<S> {
    /// What happened
    pub kind: EventKind,
    /// Node the event concerns (`__start__` / `__end__` for chain events)
    pub node_name: String,
    /// State at the time of the event
    pub state: S,
    /// Error message for failures
    pub error: Option<String>,
    /// When the event was produced
    pub timestamp: DateTime<Utc>,
    /// Run that produced the event
    pub run_id: String,
    /// Node execution time (NodeComplete / NodeError)
    pub duration: Option<Duration>,
    /// Extra details (checkpoint ids, interrupt payloads, ...)
    pub metadata: HashMap<String, Value>,
}

impl<S> GraphEvent<S> {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind, node_name: impl Into<String>, state: S, run_id: impl Into<String>) -> Self {
        Self {
            kind,
            node_name: node_name.into(),
            state,
            error: None,
            timestamp: Utc::now(),
            run_id: run_id.into(),
            duration: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach an error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach a duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Which events a stream delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Every event
    #[default]
    Debug,
    /// Node completions and failures, interrupts and the final ChainEnd
    Updates,
}

impl StreamMode {
    /// Whether events of `kind` are delivered in this mode
    pub fn accepts(&self, kind: EventKind) -> bool {
        match self {
            StreamMode::Debug => true,
            StreamMode::Updates => matches!(
                kind,
                EventKind::NodeComplete
                    | EventKind::NodeError
                    | EventKind::Interrupted
                    | EventKind::ChainEnd
            ),
        }
    }
}

/// Default capacity of the stream channel
pub const DEFAULT_STREAM_BUFFER: usize = 100;

/// Stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Channel capacity; a full channel makes the run wait for the consumer
    pub buffer_size: usize,
    /// Event filter
    pub mode: StreamMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_STREAM_BUFFER,
            mode: StreamMode::Debug,
        }
    }
}

impl StreamConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel capacity (at least 1)
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Set the event filter
    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Stream of execution events
pub type EventStream<S> = Pin<Box<dyn Stream<Item = GraphEvent<S>> + Send>>;

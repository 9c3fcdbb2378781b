//! # flowgraph-core - Stateful Directed-Graph Execution
//!
//! **Run multi-step workflows as graphs of async nodes** over a shared,
//! application-defined state, with concurrent branches, checkpointed resume,
//! human-in-the-loop pauses and live event streams.
//!
//! ## Overview
//!
//! A workflow is a directed graph whose nodes are opaque async functions
//! `(NodeContext, S) -> Result<S, NodeError>`. The engine walks the graph
//! from its entry point to the terminal [`END`]:
//!
//! - **Sequential steps** - a node's output flows into its single successor
//! - **Conditional routing** - a router looks at the state and picks the next node
//! - **Fan-out / fan-in** - several successors run concurrently; their outputs
//!   are merged through the state schema, deterministically, before the
//!   convergence node runs once
//! - **Checkpoints** - every completed node appends a versioned snapshot to a
//!   [`CheckpointStore`](flowgraph_checkpoint::CheckpointStore), so a crashed
//!   or paused run continues where it stopped
//! - **Interrupts** - static (before/after a node) or dynamic (a node calls
//!   [`interrupt`]) pauses that a caller resumes later, optionally with a value
//! - **Observation** - listeners and a backpressured event stream see every
//!   node start, completion, error and checkpoint
//!
//! ## Core Concepts
//!
//! ### 1. StateGraph and CompiledGraph
//!
//! [`StateGraph`] is the mutable builder. [`StateGraph::compile`] validates
//! it (entry point, reachability, ambiguous edges, concurrent write
//! conflicts) and freezes it into a [`CompiledGraph`], which is cheap to
//! clone and safe to invoke concurrently.
//!
//! ### 2. State and Schemas
//!
//! Any `Clone + Send + Sync + 'static` type can be the state. A
//! [`StateSchema`] decides how node outputs combine with it:
//! [`LastValue`] (replace), [`FieldSchema`] (per-field reducers over JSON
//! objects) or [`FnSchema`] (typed merge closure).
//!
//! ### 3. Checkpointing and Recovery
//!
//! Attach a store with [`CompiledGraph::with_checkpointer`]. Checkpoints of
//! one logical run share a thread id; [`CompiledGraph::recovery_config`]
//! turns the latest one into a configuration that resumes after the last
//! completed node.
//!
//! ### 4. Interrupts
//!
//! A paused run returns `Ok` with [`RunStatus::Interrupted`] and an
//! [`Interrupt`] describing where it stopped.
//! [`Interrupt::resume_config`] builds the configuration that continues it.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowgraph_core::state::{AppendReducer, FieldSchema};
//! use flowgraph_core::{StateGraph, END};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> flowgraph_core::Result<()> {
//!     let schema = FieldSchema::new().with_field("steps", AppendReducer);
//!     let mut graph = StateGraph::with_schema(schema);
//!
//!     graph
//!         .add_node("fetch", "load the document", |_ctx, _state| async move {
//!             Ok(json!({"steps": ["fetch"], "doc": "hello"}))
//!         })?
//!         .add_node("summarize", "shorten it", |_ctx, _state| async move {
//!             Ok(json!({"steps": ["summarize"]}))
//!         })?
//!         .add_node("classify", "tag it", |_ctx, _state| async move {
//!             Ok(json!({"steps": ["classify"]}))
//!         })?
//!         .add_node("publish", "write the result", |_ctx, _state| async move {
//!             Ok(json!({"steps": ["publish"]}))
//!         })?
//!         .set_entry_point("fetch");
//!
//!     // fetch fans out to two branches that converge on publish
//!     graph
//!         .add_edge("fetch", "summarize")?
//!         .add_edge("fetch", "classify")?
//!         .add_edge("summarize", "publish")?
//!         .add_edge("classify", "publish")?
//!         .add_edge("publish", END)?;
//!
//!     let result = graph.compile()?.invoke(json!({"steps": []})).await?;
//!     assert_eq!(
//!         result.state["steps"],
//!         json!(["fetch", "summarize", "classify", "publish"])
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ StateGraph<S> ── compile() ──▶ CompiledGraph<S>              │
//! │                                   │                          │
//! │        invoke / stream / resume   ▼                          │
//! │                           ┌──────────────┐                   │
//! │  RunConfig ─────────────▶ │    engine    │ ──▶ listeners     │
//! │  (thread, timeout,        │  run_path    │ ──▶ event stream  │
//! │   interrupts, cancel)     │  fan_out     │                   │
//! │                           └──────┬───────┘                   │
//! │                                  │ append                    │
//! │                                  ▼                           │
//! │                    CheckpointStore (memory / file)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`graph`] - builder, compile-time validation, [`START`] / [`END`]
//! - [`compiled`] - invoke, resume, streaming, state inspection
//! - [`state`] - schemas and reducers
//! - [`node`] - node and router contracts, [`NodeContext`]
//! - [`interrupt`] - pause points and resume tokens
//! - [`listener`] - event observers (logging, metrics, closures)
//! - [`stream`] - event types and stream configuration
//! - [`config`] - per-run and engine-wide settings
//! - [`visualization`] - Mermaid / DOT / ASCII export
//! - [`error`] - [`GraphError`]
//!
//! ## See Also
//!
//! - [`flowgraph_checkpoint`] - checkpoint model and storage backends

pub mod compiled;
pub mod config;
pub(crate) mod engine;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod listener;
pub mod node;
pub mod state;
pub mod stream;
pub(crate) mod topology;
pub mod visualization;

pub use compiled::{CompiledGraph, ExecutionResult, RunStatus, StateSnapshot};
pub use config::{CheckpointConfig, EngineConfig, RunConfig, DEFAULT_CANCEL_GRACE, DEFAULT_RECURSION_LIMIT};
pub use error::{GraphError, Result};
pub use graph::{StateGraph, END, START};
pub use interrupt::{interrupt, Interrupt, InterruptConfig, InterruptWhen, NodeInterrupt, ResumeToken};
pub use listener::{FnListener, ListenerError, LoggingListener, MetricsListener, NodeListener};
pub use node::{NodeContext, NodeError, NodeFn, NodeResult, RouterFn};
pub use state::{
    append, AppendReducer, FieldSchema, FnSchema, LastValue, MergeReducer, OverwriteReducer, Reducer, State,
    StateError, StateSchema, SumReducer,
};
pub use stream::{EventKind, EventStream, GraphEvent, StreamConfig, StreamMode, DEFAULT_STREAM_BUFFER};
pub use visualization::{Direction, VisualizationFormat, VisualizationOptions};

pub use flowgraph_checkpoint;
pub use flowgraph_checkpoint::{
    Checkpoint, CheckpointError, CheckpointSource, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};

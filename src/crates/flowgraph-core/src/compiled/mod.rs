//! Runtime for compiled graphs
//!
//! A [`CompiledGraph`] is the frozen form of a [`StateGraph`](crate::StateGraph).
//! It can be invoked any number of times, concurrently, and never changes
//! after compilation; per-run settings travel in a
//! [`RunConfig`](crate::RunConfig).
//!
//! # Execution Model
//!
//! - **Sequential**: a node with one successor hands its output state to it.
//! - **Fan-out**: a node with several static successors starts one branch per
//!   successor. Each branch runs on a copy of the fan-out state until it
//!   reaches the branches' convergence node.
//! - **Fan-in**: branch outputs are folded onto the fan-out state through the
//!   graph's schema in branch declaration order, then the convergence node
//!   runs exactly once on the merged state.
//! - **Routing**: a node with a router runs the single target it returns.
//!
//! # Entry Points
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`invoke`](CompiledGraph::invoke) | run to completion (or pause) |
//! | [`invoke_with_config`](CompiledGraph::invoke_with_config) | run with thread, timeout, listeners, interrupts |
//! | [`resume`](CompiledGraph::resume) | continue a thread from a checkpoint |
//! | [`stream`](CompiledGraph::stream) | observe events while the run executes |
//! | [`get_state`](CompiledGraph::get_state) / [`get_state_history`](CompiledGraph::get_state_history) | inspect checkpoints |
//! | [`update_state`](CompiledGraph::update_state) | fork a thread with edited state |
//! | [`recovery_config`](CompiledGraph::recovery_config) | pick up a crashed thread |

mod execution;
mod graph;
mod state;
mod streaming;
mod types;

pub use graph::CompiledGraph;
pub use types::{ExecutionResult, RunStatus, StateSnapshot};

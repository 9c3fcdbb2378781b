//! Execution engine
//!
//! One call to [`execute`] drives one run: it resolves where the run starts
//! (entry point, checkpoint, or explicit resume nodes), builds the run's
//! [`RunContext`](context::RunContext), walks the graph and turns the
//! outcome into an [`ExecutionResult`].
//!
//! ```text
//! execute
//!   ├─ resolve start: resume_from > checkpoint.next > entry point
//!   │      └─ on failure: ChainEnd with the error, nothing else
//!   ├─ ChainStart
//!   ├─ run_path ──▶ execute_node ──▶ persist ──▶ successors
//!   │      └─ fan_out ──▶ run_path per branch ──▶ merge in branch order
//!   └─ ChainEnd (Interrupted first when paused)
//! ```

pub(crate) mod context;
pub(crate) mod path;

use crate::compiled::{CompiledGraph, ExecutionResult, RunStatus};
use crate::config::RunConfig;
use crate::error::{GraphError, Result};
use crate::graph::{END, START};
use crate::interrupt::Interrupt;
use crate::listener::notify;
use crate::state::State;
use crate::stream::{EventKind, GraphEvent};
use context::RunContext;
use flowgraph_checkpoint::{CheckpointError, CheckpointSource};
use parking_lot::Mutex;
use path::{run_path, PathEnd};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub(crate) async fn execute<S: State>(
    compiled: &CompiledGraph<S>,
    input: S,
    config: RunConfig<S>,
) -> Result<ExecutionResult<S>> {
    let run_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "graph_run",
        run_id = %run_id,
        thread_id = tracing::field::Empty
    );
    execute_inner(compiled, input, config, run_id)
        .instrument(span)
        .await
}

/// Where a run begins, resolved before any event is emitted
struct Start<S> {
    thread_id: Option<String>,
    frontier: Vec<String>,
    loaded: Option<(S, String)>,
}

async fn resolve_start<S: State>(compiled: &CompiledGraph<S>, config: &RunConfig<S>) -> Result<Start<S>> {
    let graph = &compiled.graph;
    let loaded = match &config.checkpoint_id {
        Some(id) => {
            let checkpoint = compiled.checkpoint.as_ref().ok_or_else(|| {
                GraphError::Configuration("checkpoint_id given but no checkpointer configured".to_string())
            })?;
            Some(checkpoint.store.load(id).await?)
        }
        None => None,
    };

    let thread_id = config
        .thread_id
        .clone()
        .or_else(|| loaded.as_ref().map(|c| c.thread_id.clone()))
        .or_else(|| compiled.checkpoint.as_ref().map(|_| Uuid::new_v4().to_string()));

    let start: Vec<String> = match (&config.resume_from, &loaded) {
        (Some(nodes), _) => nodes.clone(),
        (None, Some(checkpoint)) => checkpoint.next_nodes().to_vec(),
        (None, None) => vec![graph.entry.clone()],
    };
    let mut frontier: Vec<String> = Vec::new();
    for node in start {
        if node == START {
            return Err(GraphError::UnknownNode(node));
        }
        if node != END && !graph.contains(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        if !frontier.contains(&node) {
            frontier.push(node);
        }
    }

    Ok(Start {
        thread_id,
        frontier,
        loaded: loaded.map(|c| (c.state, c.id)),
    })
}

async fn execute_inner<S: State>(
    compiled: &CompiledGraph<S>,
    input: S,
    config: RunConfig<S>,
    run_id: String,
) -> Result<ExecutionResult<S>> {
    let graph = Arc::clone(&compiled.graph);
    let is_resume = config.is_resume();

    // A run that cannot start still ends with ChainEnd, so streams and
    // listeners see the failure.
    let Start {
        thread_id,
        frontier,
        loaded,
    } = match resolve_start(compiled, &config).await {
        Ok(start) => start,
        Err(e) => {
            tracing::error!(error = %e, "run could not start");
            let event = GraphEvent::new(EventKind::ChainEnd, END, input, run_id).with_error(e.to_string());
            for listener in graph.listeners.iter().chain(&config.listeners) {
                notify(listener, &event).await;
            }
            return Err(e);
        }
    };
    if let Some(thread_id) = &thread_id {
        tracing::Span::current().record("thread_id", thread_id.as_str());
    }

    let (state, parent) = match loaded {
        Some((state, id)) => (state, Some(id)),
        None => (input, None),
    };

    let resume_pending: HashSet<String> = if is_resume {
        frontier.iter().cloned().collect()
    } else {
        HashSet::new()
    };

    let ctx = Arc::new(RunContext {
        graph,
        run_id: run_id.clone(),
        thread_id: thread_id.clone(),
        cancel: config.cancel.map(|t| t.child_token()).unwrap_or_default(),
        configurable: Arc::new(config.configurable),
        interrupts: compiled
            .interrupts
            .extended(&config.interrupt_before, &config.interrupt_after),
        resume_pending: Mutex::new(resume_pending),
        resume_value: config.resume_value,
        listeners: config.listeners,
        checkpoint: compiled.checkpoint.clone(),
        last_checkpoint: Mutex::new(parent),
        steps: AtomicUsize::new(0),
        recursion_limit: config.recursion_limit.unwrap_or(compiled.recursion_limit),
        cancel_grace: compiled.cancel_grace,
    });

    tracing::info!(start = ?frontier, resume = is_resume, "run started");
    ctx.emit(ctx.event(EventKind::ChainStart, START, &state)).await;

    let mut run = run_path(Arc::clone(&ctx), frontier, state.clone(), None, None, false);
    let outcome = match config.timeout {
        Some(limit) => {
            tokio::select! {
                result = &mut run => result,
                _ = tokio::time::sleep(limit) => {
                    tracing::warn!(timeout_ms = limit.as_millis() as u64, "run deadline exceeded");
                    ctx.cancel.cancel();
                    let _ = tokio::time::timeout(ctx.cancel_grace, &mut run).await;
                    Err(GraphError::DeadlineExceeded)
                }
            }
        }
        None => run.await,
    };

    match outcome {
        Ok(outcome) => {
            let checkpoint_id = ctx.last_checkpoint_id();
            match outcome.end {
                PathEnd::Terminal | PathEnd::Joined => {
                    tracing::info!(steps = ctx.steps.load(Ordering::SeqCst), "run finished");
                    ctx.emit(ctx.event(EventKind::ChainEnd, END, &outcome.state)).await;
                    Ok(ExecutionResult {
                        state: outcome.state,
                        status: RunStatus::Completed,
                        interrupt: None,
                        run_id,
                        thread_id,
                        checkpoint_id,
                    })
                }
                PathEnd::Interrupted(pause) => {
                    let interrupt = Interrupt::new(
                        thread_id.clone(),
                        pause.node,
                        pause.when,
                        pause.next,
                        pause.value,
                        pause.checkpoint_id.or(checkpoint_id.clone()),
                    );
                    tracing::info!(node = %interrupt.node, when = interrupt.when.as_str(), "run interrupted");
                    let event = ctx
                        .event(EventKind::Interrupted, &interrupt.node, &outcome.state)
                        .with_metadata("interrupt", serde_json::to_value(&interrupt).unwrap_or(json!(null)));
                    ctx.emit(event).await;
                    ctx.emit(ctx.event(EventKind::ChainEnd, END, &outcome.state)).await;
                    Ok(ExecutionResult {
                        state: outcome.state,
                        status: RunStatus::Interrupted,
                        checkpoint_id: interrupt.checkpoint_id.clone(),
                        interrupt: Some(interrupt),
                        run_id,
                        thread_id,
                    })
                }
            }
        }
        Err(e) => {
            if e.is_cancellation() {
                tracing::info!(error = %e, "run stopped");
            } else {
                tracing::error!(error = %e, "run failed");
            }
            let event = ctx.event(EventKind::ChainEnd, END, &state).with_error(e.to_string());
            ctx.emit(event).await;
            Err(e)
        }
    }
}

/// Latest checkpoint of `thread_id` a run can safely restart from, or `NotFound`
///
/// Branch checkpoints are skipped: they only describe one branch of a
/// fan-out whose siblings may not have finished. Falling back to the last
/// loop or merge checkpoint reruns the whole fan-out instead.
pub(crate) async fn recovery_point<S: State>(
    compiled: &CompiledGraph<S>,
    thread_id: &str,
) -> Result<flowgraph_checkpoint::Checkpoint<S>> {
    let history = compiled.store()?.list_by_thread(thread_id).await?;
    let count = history.len();
    let point = history
        .into_iter()
        .rev()
        .find(|c| c.metadata.source != Some(CheckpointSource::Branch));
    match point {
        Some(checkpoint) => {
            tracing::debug!(
                thread_id,
                version = checkpoint.version,
                "recovery point found"
            );
            Ok(checkpoint)
        }
        None if count > 0 => Err(CheckpointError::NotFound(format!(
            "thread '{}' has only branch checkpoints",
            thread_id
        ))
        .into()),
        None => Err(CheckpointError::NotFound(format!("no checkpoints for thread '{}'", thread_id)).into()),
    }
}

//! Path walking: sequential steps, fan-out and fan-in
//!
//! A path is a sequence of node executions on one state copy. When a node
//! has several successors the path spawns one task per branch and waits for
//! all of them at the convergence node:
//!
//! ```text
//!            ┌─▶ b ─▶ b2 ─┐
//!   a ─▶ fan │            ├─▶ merge ─▶ d ─▶ ...
//!            └─▶ c ───────┘
//! ```
//!
//! Each branch records the raw outputs of the nodes it ran. After all
//! branches finish, the outputs are folded onto the fan-out state through
//! the schema in branch index order, so the merged state never depends on
//! which branch finished first.

use super::context::RunContext;
use crate::error::{GraphError, Result};
use crate::graph::END;
use crate::interrupt::{InterruptWhen, NodeInterrupt};
use crate::node::NodeError;
use crate::state::State;
use crate::stream::EventKind;
use flowgraph_checkpoint::CheckpointSource;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Where a paused path stopped
#[derive(Debug, Clone)]
pub(crate) struct Interruption {
    pub(crate) node: String,
    pub(crate) when: InterruptWhen,
    pub(crate) next: Vec<String>,
    pub(crate) value: Option<Value>,
    pub(crate) checkpoint_id: Option<String>,
}

pub(crate) enum PathEnd {
    /// Every node on the path routed to the terminal
    Terminal,
    /// The path arrived at the convergence node it was told to stop at
    Joined,
    Interrupted(Interruption),
}

pub(crate) struct PathOutcome<S> {
    pub(crate) state: S,
    /// Raw node outputs, in execution order
    pub(crate) updates: Vec<S>,
    pub(crate) end: PathEnd,
}

enum Step<S> {
    Continue { state: S, output: S, next: Vec<String> },
    Paused { state: S, output: Option<S>, interruption: Interruption },
}

/// Walk the graph from `start` until the terminal, `stop_at`, or a pause
///
/// `in_branch` marks paths spawned by a fan-out. Their checkpoints are
/// written with [`CheckpointSource::Branch`]: sibling branches may still be
/// running, so those checkpoints are not safe points to recover from.
pub(crate) fn run_path<S: State>(
    ctx: Arc<RunContext<S>>,
    start: Vec<String>,
    state: S,
    stop_at: Option<String>,
    source: Option<String>,
    in_branch: bool,
) -> BoxFuture<'static, Result<PathOutcome<S>>> {
    async move {
        let mut frontier = start;
        let mut state = state;
        let mut updates = Vec::new();
        let mut source = source;

        loop {
            frontier.retain(|node| node != END);

            if frontier.len() == 1 {
                let node = frontier.remove(0);
                if stop_at.as_deref() == Some(node.as_str()) {
                    return Ok(PathOutcome {
                        state,
                        updates,
                        end: PathEnd::Joined,
                    });
                }
                match execute_node(&ctx, &node, state, in_branch).await? {
                    Step::Continue {
                        state: merged,
                        output,
                        next,
                    } => {
                        updates.push(output);
                        state = merged;
                        frontier = next;
                        source = Some(node);
                    }
                    Step::Paused {
                        state,
                        output,
                        interruption,
                    } => {
                        updates.extend(output);
                        return Ok(PathOutcome {
                            state,
                            updates,
                            end: PathEnd::Interrupted(interruption),
                        });
                    }
                }
                continue;
            }

            if frontier.is_empty() {
                return Ok(PathOutcome {
                    state,
                    updates,
                    end: PathEnd::Terminal,
                });
            }

            let branches = std::mem::take(&mut frontier);
            let origin = source
                .clone()
                .unwrap_or_else(|| branches[0].clone());
            let join = ctx.graph.join_for(source.as_deref(), &branches);
            let stop = match (join, &stop_at) {
                (Some(join), Some(outer)) if join != *outer && ctx.graph.topology.reaches(outer, &join) => {
                    Some(outer.clone())
                }
                (Some(join), _) => Some(join),
                (None, outer) => outer.clone(),
            };

            let fan_in = fan_out(&ctx, branches, state, stop.clone()).await?;
            state = fan_in.state;
            updates.extend(fan_in.updates);

            if let Some(first) = fan_in.interrupted.first().cloned() {
                let mut next: Vec<String> = Vec::new();
                for pause in &fan_in.interrupted {
                    for node in &pause.next {
                        if !next.contains(node) {
                            next.push(node.clone());
                        }
                    }
                }
                let checkpoint_id = ctx
                    .persist(
                        &first.node,
                        &state,
                        written_as(in_branch, CheckpointSource::Merge),
                        &next,
                        Some((first.when, first.value.clone())),
                    )
                    .await?
                    .or(first.checkpoint_id);
                return Ok(PathOutcome {
                    state,
                    updates,
                    end: PathEnd::Interrupted(Interruption {
                        node: first.node,
                        when: first.when,
                        next,
                        value: first.value,
                        checkpoint_id,
                    }),
                });
            }

            match stop {
                Some(stop) if fan_in.joined => {
                    if stop_at.as_deref() == Some(stop.as_str()) {
                        return Ok(PathOutcome {
                            state,
                            updates,
                            end: PathEnd::Joined,
                        });
                    }
                    ctx.persist(
                        &stop,
                        &state,
                        written_as(in_branch, CheckpointSource::Merge),
                        std::slice::from_ref(&stop),
                        None,
                    )
                    .await?;
                    frontier = vec![stop];
                    source = None;
                }
                _ => {
                    ctx.persist(&origin, &state, written_as(in_branch, CheckpointSource::Merge), &[], None)
                        .await?;
                    return Ok(PathOutcome {
                        state,
                        updates,
                        end: PathEnd::Terminal,
                    });
                }
            }
        }
    }
    .boxed()
}

struct FanIn<S> {
    state: S,
    updates: Vec<S>,
    joined: bool,
    interrupted: Vec<Interruption>,
}

async fn fan_out<S: State>(
    ctx: &Arc<RunContext<S>>,
    branches: Vec<String>,
    base: S,
    stop: Option<String>,
) -> Result<FanIn<S>> {
    tracing::debug!(branches = ?branches, join = ?stop, "fan-out");

    let mut set = JoinSet::new();
    let count = branches.len();
    for (index, start) in branches.into_iter().enumerate() {
        let branch = run_path(Arc::clone(ctx), vec![start], base.clone(), stop.clone(), None, true);
        set.spawn(async move { (index, branch.await) }.in_current_span());
    }

    let mut outcomes: Vec<Option<PathOutcome<S>>> = (0..count).map(|_| None).collect();
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                drain(&mut set, ctx.cancel_grace).await;
                return Err(GraphError::Cancelled);
            }
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok((index, Ok(outcome)))) => outcomes[index] = Some(outcome),
                Some(Ok((_, Err(e)))) => {
                    set.shutdown().await;
                    return Err(e);
                }
                Some(Err(e)) => {
                    set.shutdown().await;
                    return Err(GraphError::Execution(format!("branch task failed: {}", e)));
                }
            }
        }
    }

    let mut state = base;
    let mut updates = Vec::new();
    let mut joined = false;
    let mut interrupted = Vec::new();
    for outcome in outcomes.into_iter().flatten() {
        for update in &outcome.updates {
            state = ctx.graph.schema.update(&state, update)?;
        }
        updates.extend(outcome.updates);
        match outcome.end {
            PathEnd::Joined => joined = true,
            PathEnd::Terminal => {}
            PathEnd::Interrupted(pause) => interrupted.push(pause),
        }
    }
    tracing::debug!(join = ?stop, joined, "fan-in merged");

    Ok(FanIn {
        state,
        updates,
        joined,
        interrupted,
    })
}

/// Give cancelled branches `grace` to wind down, then abort the rest
async fn drain<T: 'static>(set: &mut JoinSet<T>, grace: Duration) {
    let wound_down = tokio::time::timeout(grace, async {
        while set.join_next().await.is_some() {}
    })
    .await;
    if wound_down.is_err() {
        tracing::warn!(remaining = set.len(), "aborting branches after cancellation grace period");
        set.abort_all();
    }
}

/// A panicking node fails like one that returned an error
fn panic_error(payload: Box<dyn Any + Send>) -> NodeError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("node panicked: {}", message).into()
}

fn written_as(in_branch: bool, source: CheckpointSource) -> CheckpointSource {
    if in_branch {
        CheckpointSource::Branch
    } else {
        source
    }
}

async fn execute_node<S: State>(
    ctx: &Arc<RunContext<S>>,
    node: &str,
    state: S,
    in_branch: bool,
) -> Result<Step<S>> {
    if ctx.cancel.is_cancelled() {
        return Err(GraphError::Cancelled);
    }
    let spec = ctx
        .graph
        .nodes
        .get(node)
        .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;

    let resuming = ctx.take_resume(node);
    if !resuming && ctx.interrupts.should_interrupt_before(node) {
        return pause_before(ctx, node, state, None, in_branch).await;
    }

    let step = ctx.next_step()?;
    tracing::debug!(node, step, "node started");
    ctx.emit(ctx.event(EventKind::NodeStart, node, &state)).await;

    let mut node_ctx = ctx.node_context(node);
    if resuming {
        node_ctx = node_ctx.as_resumed().with_resume_value(ctx.resume_value.clone());
    }
    let started = Instant::now();

    let result = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(GraphError::Cancelled),
        result = AssertUnwindSafe(async { (spec.func)(node_ctx.clone(), state.clone()).await })
            .catch_unwind() => result.unwrap_or_else(|payload| Err(panic_error(payload))),
    };
    let elapsed = started.elapsed();

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            if let Some(request) = e.downcast_ref::<NodeInterrupt>() {
                let value = request.value.clone();
                return pause_before(ctx, node, state, Some(value), in_branch).await;
            }
            tracing::error!(node, error = %e, "node failed");
            let event = ctx
                .event(EventKind::NodeError, node, &state)
                .with_error(e.to_string())
                .with_duration(elapsed);
            ctx.emit(event).await;
            return Err(GraphError::node_execution(node, e));
        }
    };

    let merged = ctx.graph.schema.update(&state, &output)?;
    let event = ctx
        .event(EventKind::NodeComplete, node, &merged)
        .with_duration(elapsed)
        .with_metadata("step", step.into());
    ctx.emit(event).await;

    let next = ctx.graph.successors(&node_ctx, node, &merged)?;
    let next: Vec<String> = next.into_iter().filter(|n| n != END).collect();
    let pause_after = ctx.interrupts.should_interrupt_after(node);

    let checkpoint_id = ctx
        .persist(
            node,
            &merged,
            written_as(in_branch, CheckpointSource::Loop),
            &next,
            pause_after.then_some((InterruptWhen::After, None)),
        )
        .await?;

    if pause_after {
        tracing::info!(node, "pausing after node");
        return Ok(Step::Paused {
            state: merged,
            output: Some(output),
            interruption: Interruption {
                node: node.to_string(),
                when: InterruptWhen::After,
                next,
                value: None,
                checkpoint_id,
            },
        });
    }

    Ok(Step::Continue {
        state: merged,
        output,
        next,
    })
}

async fn pause_before<S: State>(
    ctx: &Arc<RunContext<S>>,
    node: &str,
    state: S,
    value: Option<Value>,
    in_branch: bool,
) -> Result<Step<S>> {
    tracing::info!(node, dynamic = value.is_some(), "pausing before node");
    let next = vec![node.to_string()];
    let checkpoint_id = ctx
        .persist(
            node,
            &state,
            written_as(in_branch, CheckpointSource::Loop),
            &next,
            Some((InterruptWhen::Before, value.clone())),
        )
        .await?;
    Ok(Step::Paused {
        state,
        output: None,
        interruption: Interruption {
            node: node.to_string(),
            when: InterruptWhen::Before,
            next,
            value,
            checkpoint_id,
        },
    })
}

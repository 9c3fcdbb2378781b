//! Graph definition builder and compiler
//!
//! [`StateGraph`] is the mutable definition of a workflow: named async nodes,
//! static edges, conditional edges chosen by a router, and an entry point.
//! [`StateGraph::compile`] validates the definition and freezes it into a
//! [`CompiledGraph`](crate::CompiledGraph) that can be invoked any number of
//! times, concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  StateGraph<S> (builder)                      │
//! │                                               │
//! │   START ──▶ fetch ──┬──▶ summarize ──┐        │
//! │                     └──▶ classify ───┴─▶ join │
//! │                                          │    │
//! │                         router(state) ◀──┘    │
//! │                          ├─▶ publish ─▶ END   │
//! │                          └─▶ fetch (loop)     │
//! └───────────────────────────────────────────────┘
//!                     │ compile()
//!                     ▼
//!   CompiledGraph<S>: frozen node/edge table, schema,
//!   precomputed fan-in points, checkpoint and interrupt settings
//! ```
//!
//! # Edges
//!
//! - A node with **one** static edge runs its successor next.
//! - A node with **several** static edges fans out: every successor runs
//!   concurrently on its own copy of the state, and the branches are merged
//!   where they converge (see [`CompiledGraph`](crate::CompiledGraph)).
//! - A node with a **conditional** edge asks its router for exactly one
//!   successor. A node has static edges or one router, never both.
//!
//! # Compile-Time Validation
//!
//! `compile()` fails with, in this order:
//!
//! | Error | Condition |
//! |-------|-----------|
//! | `NoEntryPoint` | no entry point set |
//! | `UnknownNode` | entry point or an edge target is not registered |
//! | `UnreachableNode` | a node cannot be reached from the entry point |
//! | `MissingEdge` | a node has no outgoing edge |
//! | `AmbiguousEdge` | a node has static and conditional edges, or two routers |
//! | `TerminalUnreachable` | no path reaches [`END`] |
//! | `ConcurrentWriteConflict` | two branches of a fan-out declare writes to an unreduced field |
//!
//! # Quick Start
//!
//! ```rust
//! use flowgraph_core::{StateGraph, END};
//!
//! # async fn example() -> flowgraph_core::Result<()> {
//! let mut graph = StateGraph::<i64>::new();
//! graph
//!     .add_node("double", "multiply by two", |_ctx, n| async move { Ok(n * 2) })?
//!     .add_node("inc", "add one", |_ctx, n| async move { Ok(n + 1) })?
//!     .add_edge("double", "inc")?
//!     .add_edge("inc", END)?
//!     .set_entry_point("double");
//!
//! let compiled = graph.compile()?;
//! let result = compiled.invoke(20).await?;
//! assert_eq!(result.state, 41);
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::config::RunConfig;
use crate::error::{GraphError, Result};
use crate::interrupt::NodeInterrupt;
use crate::listener::NodeListener;
use crate::node::{NodeContext, NodeFn, NodeResult, RouterFn};
use crate::state::{LastValue, State, StateSchema};
use crate::topology::Topology;
use futures::FutureExt;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Name used with [`StateGraph::add_edge`] to mark the entry point
pub const START: &str = "__start__";

/// Terminal sentinel: routing here ends the path
pub const END: &str = "__end__";

pub(crate) struct NodeSpec<S: State> {
    pub(crate) description: String,
    pub(crate) func: NodeFn<S>,
    pub(crate) listeners: Vec<Arc<dyn NodeListener<S>>>,
    pub(crate) writes: Vec<String>,
}

impl<S: State> Clone for NodeSpec<S> {
    fn clone(&self) -> Self {
        Self {
            description: self.description.clone(),
            func: Arc::clone(&self.func),
            listeners: self.listeners.clone(),
            writes: self.writes.clone(),
        }
    }
}

pub(crate) struct ConditionalEdge<S: State> {
    pub(crate) router: RouterFn<S>,
    /// Declared possible targets; `None` means any node
    pub(crate) targets: Option<Vec<String>>,
}

/// Builder for a stateful graph over state type `S`
pub struct StateGraph<S: State> {
    nodes: HashMap<String, NodeSpec<S>>,
    order: Vec<String>,
    edges: HashMap<String, Vec<String>>,
    conditional: HashMap<String, Vec<ConditionalEdge<S>>>,
    entry: Option<String>,
    schema: Arc<dyn StateSchema<S>>,
    listeners: Vec<Arc<dyn NodeListener<S>>>,
}

impl<S: State> Default for StateGraph<S> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            conditional: HashMap::new(),
            entry: None,
            schema: Arc::new(LastValue),
            listeners: Vec::new(),
        }
    }
}

impl<S: State> fmt::Debug for StateGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGraph")
            .field("nodes", &self.order)
            .field("edges", &self.edges)
            .field("conditional", &self.conditional.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("schema", &self.schema.name())
            .finish()
    }
}

impl<S: State> StateGraph<S> {
    /// Create a graph whose nodes' outputs replace the state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph that merges node outputs with `schema`
    pub fn with_schema(schema: impl StateSchema<S> + 'static) -> Self {
        Self {
            schema: Arc::new(schema),
            ..Self::default()
        }
    }

    /// Replace the merge schema
    pub fn set_schema(&mut self, schema: impl StateSchema<S> + 'static) -> &mut Self {
        self.schema = Arc::new(schema);
        self
    }

    /// Register a node
    ///
    /// # Errors
    ///
    /// `DuplicateNode` if the name is taken; `UnknownNode` for the reserved
    /// names [`START`] and [`END`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use flowgraph_core::{GraphError, StateGraph};
    ///
    /// let mut graph = StateGraph::<u32>::new();
    /// graph.add_node("a", "first", |_ctx, s| async move { Ok(s) }).unwrap();
    ///
    /// let err = graph.add_node("a", "again", |_ctx, s| async move { Ok(s) }).unwrap_err();
    /// assert!(matches!(err, GraphError::DuplicateNode(name) if name == "a"));
    /// ```
    pub fn add_node<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> Result<&mut Self>
    where
        F: Fn(NodeContext, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NodeResult<S>> + Send + 'static,
    {
        let func: NodeFn<S> = Arc::new(move |ctx, state| f(ctx, state).boxed());
        self.insert_node(name.into(), description.into(), func)
    }

    fn insert_node(&mut self, name: String, description: String, func: NodeFn<S>) -> Result<&mut Self> {
        if name == START || name == END {
            return Err(GraphError::UnknownNode(name));
        }
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.nodes.insert(
            name.clone(),
            NodeSpec {
                description,
                func,
                listeners: Vec::new(),
                writes: Vec::new(),
            },
        );
        self.order.push(name);
        Ok(self)
    }

    /// Embed a compiled graph over the same state type as a node
    ///
    /// The subgraph runs on the node's input state with the parent's
    /// cancellation and `configurable` map. A pause inside the subgraph
    /// pauses the parent before this node. Resuming the parent runs the
    /// subgraph from its entry point again and continues it past that
    /// pause, handing the inner node the resume value.
    pub fn add_subgraph(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        subgraph: CompiledGraph<S>,
    ) -> Result<&mut Self> {
        let name = name.into();
        let label = name.clone();
        let func: NodeFn<S> = Arc::new(move |ctx, state| {
            run_subgraph(subgraph.clone(), label.clone(), ctx, state).boxed()
        });
        self.insert_node(name, description.into(), func)
    }

    /// Add a static edge
    ///
    /// `add_edge(START, n)` sets the entry point. The target may be
    /// registered later; it is checked by `compile()`.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> Result<&mut Self> {
        let from = from.into();
        let to = to.into();
        if from == START {
            self.entry = Some(to);
            return Ok(self);
        }
        if !self.nodes.contains_key(&from) {
            return Err(GraphError::UnknownNode(from));
        }
        let targets = self.edges.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        Ok(self)
    }

    /// Add a conditional edge whose router may pick any node or [`END`]
    pub fn add_conditional_edge<F, T>(&mut self, from: impl Into<String>, router: F) -> Result<&mut Self>
    where
        F: Fn(&NodeContext, &S) -> T + Send + Sync + 'static,
        T: Into<String>,
    {
        self.insert_router(from.into(), router, None)
    }

    /// Add a conditional edge restricted to `targets`
    ///
    /// Declared targets feed reachability, fan-in analysis and
    /// visualization; a router returning anything else fails the run with
    /// `InvalidRoute`.
    ///
    /// ```rust
    /// use flowgraph_core::{StateGraph, END};
    ///
    /// let mut graph = StateGraph::<i32>::new();
    /// graph.add_node("check", "", |_ctx, n| async move { Ok(n) }).unwrap();
    /// graph.add_node("negative", "", |_ctx, n| async move { Ok(-n) }).unwrap();
    /// graph
    ///     .add_conditional_edge_with_targets(
    ///         "check",
    ///         |_ctx, n: &i32| if *n < 0 { "negative" } else { END },
    ///         ["negative", END],
    ///     )
    ///     .unwrap();
    /// ```
    pub fn add_conditional_edge_with_targets<F, T, I, N>(
        &mut self,
        from: impl Into<String>,
        router: F,
        targets: I,
    ) -> Result<&mut Self>
    where
        F: Fn(&NodeContext, &S) -> T + Send + Sync + 'static,
        T: Into<String>,
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut declared: Vec<String> = Vec::new();
        for target in targets {
            let target = target.into();
            if !declared.contains(&target) {
                declared.push(target);
            }
        }
        self.insert_router(from.into(), router, Some(declared))
    }

    fn insert_router<F, T>(&mut self, from: String, router: F, targets: Option<Vec<String>>) -> Result<&mut Self>
    where
        F: Fn(&NodeContext, &S) -> T + Send + Sync + 'static,
        T: Into<String>,
    {
        if !self.nodes.contains_key(&from) {
            return Err(GraphError::UnknownNode(from));
        }
        let router: RouterFn<S> = Arc::new(move |ctx: &NodeContext, state: &S| {
            let target: String = router(ctx, state).into();
            target
        });
        self.conditional
            .entry(from)
            .or_default()
            .push(ConditionalEdge { router, targets });
        Ok(self)
    }

    /// Set the node execution starts at
    pub fn set_entry_point(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    /// Declare the state fields `node` writes
    ///
    /// Only used for compile-time conflict detection between concurrent
    /// branches; undeclared nodes are assumed to write nothing.
    pub fn declare_writes<I, T>(&mut self, node: &str, fields: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let spec = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;
        spec.writes.extend(fields.into_iter().map(Into::into));
        Ok(self)
    }

    /// Attach a listener that only sees `node`'s events
    pub fn add_node_listener(&mut self, node: &str, listener: Arc<dyn NodeListener<S>>) -> Result<&mut Self> {
        let spec = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;
        spec.listeners.push(listener);
        Ok(self)
    }

    /// Attach a listener that sees every event of every run
    pub fn add_listener(&mut self, listener: Arc<dyn NodeListener<S>>) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    /// Registered node names, in registration order
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    /// Validate and freeze the graph
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let entry = self.entry.clone().ok_or(GraphError::NoEntryPoint)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }
        self.check_targets()?;

        let mut topology = Topology::new(self.order.clone());
        for (from, targets) in &self.edges {
            for to in targets {
                topology.add_edge(from, to);
            }
        }
        for (from, routers) in &self.conditional {
            for edge in routers {
                if let Some(targets) = &edge.targets {
                    for to in targets {
                        topology.add_edge(from, to);
                    }
                }
            }
        }

        let reachable = self.reachable(&entry, &topology);
        if let Some(node) = self.order.iter().find(|n| !reachable.contains(*n)) {
            return Err(GraphError::UnreachableNode(node.clone()));
        }

        for name in &self.order {
            let has_static = self.edges.get(name).is_some_and(|e| !e.is_empty());
            let routers = self.conditional.get(name).map_or(0, Vec::len);
            if !has_static && routers == 0 {
                return Err(GraphError::MissingEdge(name.clone()));
            }
        }
        for name in &self.order {
            let has_static = self.edges.get(name).is_some_and(|e| !e.is_empty());
            let routers = self.conditional.get(name).map_or(0, Vec::len);
            if (has_static && routers > 0) || routers > 1 {
                return Err(GraphError::AmbiguousEdge(name.clone()));
            }
        }

        let terminal_reachable = self.order.iter().filter(|n| reachable.contains(*n)).any(|n| {
            self.edges.get(n).is_some_and(|e| e.iter().any(|t| t == END))
                || self.conditional.get(n).is_some_and(|routers| {
                    routers.iter().any(|edge| match &edge.targets {
                        Some(targets) => targets.iter().any(|t| t == END),
                        None => true,
                    })
                })
        });
        if !terminal_reachable {
            return Err(GraphError::TerminalUnreachable);
        }

        let mut joins = HashMap::new();
        for (from, targets) in &self.edges {
            let branches: Vec<String> = targets.iter().filter(|t| *t != END).cloned().collect();
            if branches.len() > 1 {
                joins.insert(from.clone(), topology.find_join(&branches));
            }
        }

        self.check_write_conflicts(&topology, &joins)?;

        let StateGraph {
            nodes,
            order,
            edges,
            conditional,
            schema,
            listeners,
            ..
        } = self;
        let routers = conditional
            .into_iter()
            .filter_map(|(from, mut edges)| edges.pop().map(|edge| (from, edge)))
            .collect();

        tracing::debug!(
            nodes = order.len(),
            fan_outs = joins.len(),
            schema = schema.name(),
            "graph compiled"
        );

        Ok(CompiledGraph::new(GraphDef {
            nodes,
            order,
            edges,
            routers,
            entry,
            schema,
            listeners,
            joins,
            topology,
        }))
    }

    fn check_targets(&self) -> Result<()> {
        let known = |name: &String| name == END || self.nodes.contains_key(name);
        for from in &self.order {
            if let Some(targets) = self.edges.get(from) {
                if let Some(bad) = targets.iter().find(|t| !known(t)) {
                    return Err(GraphError::UnknownNode(bad.clone()));
                }
            }
            for edge in self.conditional.get(from).into_iter().flatten() {
                if let Some(bad) = edge.targets.iter().flatten().find(|t| !known(t)) {
                    return Err(GraphError::UnknownNode(bad.clone()));
                }
            }
        }
        Ok(())
    }

    fn reachable(&self, entry: &str, topology: &Topology) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([entry.to_string()]);
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.clone()) {
                continue;
            }
            let open_router = self
                .conditional
                .get(&node)
                .is_some_and(|routers| routers.iter().any(|edge| edge.targets.is_none()));
            if open_router {
                return self.order.iter().cloned().collect();
            }
            queue.extend(topology.successors(&node).iter().cloned());
        }
        seen
    }

    fn check_write_conflicts(&self, topology: &Topology, joins: &HashMap<String, Option<String>>) -> Result<()> {
        for from in &self.order {
            let Some(join) = joins.get(from) else {
                continue;
            };
            let Some(targets) = self.edges.get(from) else {
                continue;
            };
            let branches: Vec<&String> = targets.iter().filter(|t| *t != END).collect();

            // field -> (branch indices, writer nodes)
            let mut writers: BTreeMap<&str, (HashSet<usize>, Vec<String>)> = BTreeMap::new();
            for (index, start) in branches.iter().enumerate() {
                for node in branch_nodes(topology, start, join.as_deref()) {
                    let Some(spec) = self.nodes.get(&node) else {
                        continue;
                    };
                    for field in &spec.writes {
                        let entry = writers.entry(field.as_str()).or_default();
                        entry.0.insert(index);
                        if !entry.1.contains(&node) {
                            entry.1.push(node.clone());
                        }
                    }
                }
            }

            for (field, (indices, nodes)) in writers {
                if indices.len() > 1 && !self.schema.has_reducer(field) {
                    return Err(GraphError::ConcurrentWriteConflict {
                        field: field.to_string(),
                        nodes,
                    });
                }
            }
        }
        Ok(())
    }
}

async fn run_subgraph<S: State>(
    subgraph: CompiledGraph<S>,
    label: String,
    ctx: NodeContext,
    state: S,
) -> NodeResult<S> {
    let mut config = RunConfig::new().with_cancellation(ctx.cancellation_token().clone());
    config.configurable = ctx.configurable().clone();
    let mut result = subgraph.invoke_with_config(state, config.clone()).await?;

    // A resumed subgraph node replays the subgraph up to its pause, then
    // continues past it with the caller's resume value.
    if ctx.is_resumed() {
        if let Some(pause) = result.interrupt.take() {
            let mut resume = config.with_resume_from(pause.next);
            resume.resume_value = ctx.resume_value().cloned();
            result = subgraph.invoke_with_config(result.state, resume).await?;
        }
    }

    match result.interrupt {
        Some(pause) => Err(Box::new(NodeInterrupt {
            value: json!({
                "subgraph": label,
                "node": pause.node,
                "value": pause.value,
            }),
        })),
        None => Ok(result.state),
    }
}

/// Nodes a branch may run before reaching `join`
fn branch_nodes(topology: &Topology, start: &str, join: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(node) = queue.pop_front() {
        if Some(node.as_str()) == join || !seen.insert(node.clone()) {
            continue;
        }
        queue.extend(topology.successors(&node).iter().cloned());
        out.push(node);
    }
    out
}

/// Frozen graph shared by every run of a compiled graph
pub(crate) struct GraphDef<S: State> {
    pub(crate) nodes: HashMap<String, NodeSpec<S>>,
    pub(crate) order: Vec<String>,
    pub(crate) edges: HashMap<String, Vec<String>>,
    pub(crate) routers: HashMap<String, ConditionalEdge<S>>,
    pub(crate) entry: String,
    pub(crate) schema: Arc<dyn StateSchema<S>>,
    pub(crate) listeners: Vec<Arc<dyn NodeListener<S>>>,
    /// Fan-out node -> convergence node of its branches
    pub(crate) joins: HashMap<String, Option<String>>,
    pub(crate) topology: Topology,
}

impl<S: State> GraphDef<S> {
    pub(crate) fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Successors of `node` given the state it produced, [`END`] included
    pub(crate) fn successors(&self, ctx: &NodeContext, node: &str, state: &S) -> Result<Vec<String>> {
        if let Some(edge) = self.routers.get(node) {
            let target = (edge.router)(ctx, state);
            let allowed = match &edge.targets {
                Some(targets) => targets.contains(&target),
                None => target == END || self.contains(&target),
            };
            if !allowed {
                return Err(GraphError::InvalidRoute {
                    from: node.to_string(),
                    target,
                });
            }
            tracing::debug!(from = node, to = %target, "conditional route");
            return Ok(vec![target]);
        }
        Ok(self.edges.get(node).cloned().unwrap_or_default())
    }

    /// Convergence node of branches starting at `starts`
    pub(crate) fn join_for(&self, fan_out: Option<&str>, starts: &[String]) -> Option<String> {
        if let Some(from) = fan_out {
            let precomputed = self.edges.get(from).is_some_and(|targets| {
                let branches: Vec<&String> = targets.iter().filter(|t| *t != END).collect();
                branches.len() == starts.len() && branches.iter().zip(starts).all(|(a, b)| *a == b)
            });
            if precomputed {
                if let Some(join) = self.joins.get(from) {
                    return join.clone();
                }
            }
        }
        self.topology.find_join(starts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AppendReducer, FieldSchema};
    use serde_json::Value;

    fn identity_graph(nodes: &[&str]) -> StateGraph<u32> {
        let mut graph = StateGraph::new();
        for name in nodes {
            graph.add_node(*name, "", |_ctx, s| async move { Ok(s) }).unwrap();
        }
        graph
    }

    #[test]
    fn test_duplicate_node() {
        let mut graph = identity_graph(&["a"]);
        let err = graph.add_node("a", "", |_ctx, s| async move { Ok(s) }).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(n) if n == "a"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut graph = identity_graph(&[]);
        assert!(graph.add_node(END, "", |_ctx, s| async move { Ok(s) }).is_err());
        assert!(graph.add_node(START, "", |_ctx, s| async move { Ok(s) }).is_err());
    }

    #[test]
    fn test_edge_from_unknown_node() {
        let mut graph = identity_graph(&["a"]);
        assert!(matches!(graph.add_edge("x", "a"), Err(GraphError::UnknownNode(n)) if n == "x"));
        assert!(matches!(
            graph.add_conditional_edge("x", |_ctx, _s: &u32| END),
            Err(GraphError::UnknownNode(_))
        ));
        // forward reference is fine until compile
        assert!(graph.add_edge("a", "later").is_ok());
    }

    #[test]
    fn test_start_edge_sets_entry() {
        let mut graph = identity_graph(&["a"]);
        graph.add_edge(START, "a").unwrap();
        graph.add_edge("a", END).unwrap();
        assert!(graph.compile().is_ok());
    }

    #[test]
    fn test_no_entry_point() {
        let mut graph = identity_graph(&["a"]);
        graph.add_edge("a", END).unwrap();
        assert!(matches!(graph.compile(), Err(GraphError::NoEntryPoint)));
    }

    #[test]
    fn test_unknown_target() {
        let mut graph = identity_graph(&["a"]);
        graph.add_edge("a", "ghost").unwrap();
        graph.set_entry_point("a");
        assert!(matches!(graph.compile(), Err(GraphError::UnknownNode(n)) if n == "ghost"));
    }

    #[test]
    fn test_unreachable_node() {
        let mut graph = identity_graph(&["a", "island"]);
        graph.add_edge("a", END).unwrap();
        graph.add_edge("island", END).unwrap();
        graph.set_entry_point("a");
        assert!(matches!(graph.compile(), Err(GraphError::UnreachableNode(n)) if n == "island"));
    }

    #[test]
    fn test_missing_edge() {
        let mut graph = identity_graph(&["a", "b"]);
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", END).unwrap();
        graph.set_entry_point("a");
        assert!(matches!(graph.compile(), Err(GraphError::MissingEdge(n)) if n == "b"));
    }

    #[test]
    fn test_ambiguous_edge() {
        let mut graph = identity_graph(&["a", "b"]);
        graph.add_edge("a", "b").unwrap();
        graph.add_conditional_edge("a", |_ctx, _s: &u32| "b").unwrap();
        graph.add_edge("b", END).unwrap();
        graph.set_entry_point("a");
        assert!(matches!(graph.compile(), Err(GraphError::AmbiguousEdge(n)) if n == "a"));
    }

    #[test]
    fn test_terminal_unreachable() {
        let mut graph = identity_graph(&["a", "b"]);
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "a").unwrap();
        graph.set_entry_point("a");
        assert!(matches!(graph.compile(), Err(GraphError::TerminalUnreachable)));
    }

    #[test]
    fn test_open_router_reaches_everything() {
        let mut graph = identity_graph(&["a", "b"]);
        graph.add_conditional_edge("a", |_ctx, _s: &u32| "b").unwrap();
        graph.add_edge("b", END).unwrap();
        graph.set_entry_point("a");
        assert!(graph.compile().is_ok());
    }

    #[test]
    fn test_declared_router_limits_reachability() {
        let mut graph = identity_graph(&["a", "b", "c"]);
        graph
            .add_conditional_edge_with_targets("a", |_ctx, _s: &u32| "b", ["b", END])
            .unwrap();
        graph.add_edge("b", END).unwrap();
        graph.add_edge("c", END).unwrap();
        graph.set_entry_point("a");
        assert!(matches!(graph.compile(), Err(GraphError::UnreachableNode(n)) if n == "c"));
    }

    fn fan_out_graph(schema: FieldSchema) -> StateGraph<Value> {
        let mut graph = StateGraph::with_schema(schema);
        for name in ["split", "left", "right", "join"] {
            graph.add_node(name, "", |_ctx, s| async move { Ok(s) }).unwrap();
        }
        graph.add_edge("split", "left").unwrap();
        graph.add_edge("split", "right").unwrap();
        graph.add_edge("left", "join").unwrap();
        graph.add_edge("right", "join").unwrap();
        graph.add_edge("join", END).unwrap();
        graph.set_entry_point("split");
        graph.declare_writes("left", ["summary"]).unwrap();
        graph.declare_writes("right", ["summary"]).unwrap();
        graph
    }

    #[test]
    fn test_concurrent_write_conflict() {
        let err = fan_out_graph(FieldSchema::new()).compile().unwrap_err();
        match err {
            GraphError::ConcurrentWriteConflict { field, nodes } => {
                assert_eq!(field, "summary");
                assert_eq!(nodes, vec!["left", "right"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reduced_field_is_not_a_conflict() {
        let schema = FieldSchema::new().with_field("summary", AppendReducer);
        assert!(fan_out_graph(schema).compile().is_ok());
    }

    #[test]
    fn test_join_is_precomputed() {
        let compiled = fan_out_graph(FieldSchema::new().with_field("summary", AppendReducer))
            .compile()
            .unwrap();
        let graph = compiled.graph();
        let starts = vec!["left".to_string(), "right".to_string()];
        assert_eq!(graph.join_for(Some("split"), &starts), Some("join".to_string()));
        assert_eq!(graph.join_for(None, &starts), Some("join".to_string()));
    }

    #[test]
    fn test_invalid_route() {
        let mut graph = identity_graph(&["a", "b"]);
        graph
            .add_conditional_edge_with_targets("a", |_ctx, _s: &u32| "nowhere", ["b", END])
            .unwrap();
        graph.add_edge("b", END).unwrap();
        graph.set_entry_point("a");
        let compiled = graph.compile().unwrap();

        let ctx = NodeContext::detached("a", None);
        let err = compiled.graph().successors(&ctx, "a", &0).unwrap_err();
        assert!(matches!(err, GraphError::InvalidRoute { target, .. } if target == "nowhere"));
    }
}

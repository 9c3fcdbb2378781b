//! Diagram export for compiled graphs
//!
//! Renders the frozen node/edge table as Mermaid, Graphviz DOT or plain
//! text. Rendering is read-only and has no effect on execution.
//!
//! Static edges are drawn solid. A node with a router gets a `?` decision
//! point, drawn with dashed edges to every declared target; a router without
//! declared targets shows only the decision point.
//!
//! ```text
//! flowchart TD
//!     START((START)) --> fetch
//!     fetch --> review
//!     review -.-> review_condition((?))
//!     review_condition -.-> publish
//!     review_condition -.-> fetch
//!     publish --> END((END))
//! ```

use crate::graph::{GraphDef, END, START};
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationFormat {
    #[default]
    Mermaid,
    /// Graphviz DOT
    Dot,
    Ascii,
}

/// Layout direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    TopDown,
    LeftRight,
}

impl Direction {
    fn mermaid(self) -> &'static str {
        match self {
            Direction::TopDown => "TD",
            Direction::LeftRight => "LR",
        }
    }

    fn dot(self) -> &'static str {
        match self {
            Direction::TopDown => "TB",
            Direction::LeftRight => "LR",
        }
    }
}

/// Visualization options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationOptions {
    pub format: VisualizationFormat,
    pub direction: Direction,
    pub title: Option<String>,
}

impl VisualizationOptions {
    pub fn mermaid() -> Self {
        Self {
            format: VisualizationFormat::Mermaid,
            ..Default::default()
        }
    }

    pub fn dot() -> Self {
        Self {
            format: VisualizationFormat::Dot,
            ..Default::default()
        }
    }

    pub fn ascii() -> Self {
        Self {
            format: VisualizationFormat::Ascii,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// One drawable edge, in registration order of its source
struct Link {
    from: String,
    to: String,
    conditional: bool,
}

/// Flatten the graph into entry, static and conditional links
fn links<S: State>(graph: &GraphDef<S>) -> Vec<Link> {
    let mut links = vec![Link {
        from: START.to_string(),
        to: graph.entry.clone(),
        conditional: false,
    }];
    for node in &graph.order {
        if let Some(targets) = graph.edges.get(node) {
            links.extend(targets.iter().map(|to| Link {
                from: node.clone(),
                to: to.clone(),
                conditional: false,
            }));
        }
        if let Some(edge) = graph.routers.get(node) {
            let targets = edge.targets.as_deref().unwrap_or_default();
            links.extend(targets.iter().map(|to| Link {
                from: node.clone(),
                to: to.clone(),
                conditional: true,
            }));
        }
    }
    links
}

pub(crate) fn render<S: State>(graph: &GraphDef<S>, options: &VisualizationOptions) -> String {
    match options.format {
        VisualizationFormat::Mermaid => render_mermaid(graph, options),
        VisualizationFormat::Dot => render_dot(graph, options),
        VisualizationFormat::Ascii => render_ascii(graph, options),
    }
}

fn render_mermaid<S: State>(graph: &GraphDef<S>, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    if let Some(title) = &options.title {
        let _ = writeln!(out, "---\ntitle: {}\n---", escape_mermaid(title));
    }
    let _ = writeln!(out, "flowchart {}", options.direction.mermaid());
    let _ = writeln!(out, "    {}((START))", node_id(START));
    let _ = writeln!(out, "    {}((END))", node_id(END));

    for node in &graph.order {
        let _ = writeln!(out, "    {}[\"{}\"]", node_id(node), escape_mermaid(node));
    }

    let _ = writeln!(out, "    {} --> {}", node_id(START), node_id(&graph.entry));
    for node in &graph.order {
        if let Some(targets) = graph.edges.get(node) {
            for to in targets {
                let _ = writeln!(out, "    {} --> {}", node_id(node), node_id(to));
            }
        }
        if let Some(edge) = graph.routers.get(node) {
            let id = node_id(node);
            let _ = writeln!(out, "    {} -.-> {}_condition((?))", id, id);
            for to in edge.targets.as_deref().unwrap_or_default() {
                let _ = writeln!(out, "    {}_condition -.-> {}", id, node_id(to));
            }
        }
    }
    out
}

fn render_dot<S: State>(graph: &GraphDef<S>, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    out.push_str("digraph G {\n");
    let _ = writeln!(out, "    rankdir={};", options.direction.dot());
    out.push_str("    node [shape=box, style=rounded];\n");
    if let Some(title) = &options.title {
        out.push_str("    labelloc=\"t\";\n");
        let _ = writeln!(out, "    label=\"{}\";", escape_dot(title));
    }
    out.push_str("    START [shape=circle, style=filled, fillcolor=palegreen];\n");
    out.push_str("    END [shape=doublecircle, style=filled, fillcolor=lightpink];\n");

    for node in &graph.order {
        let _ = writeln!(out, "    {} [label=\"{}\"];", dot_id(node), escape_dot(node));
        if graph.routers.contains_key(node) {
            let _ = writeln!(out, "    {}_condition [shape=diamond, label=\"?\"];", node_id(node));
        }
    }

    for link in links(graph) {
        if link.conditional {
            continue;
        }
        let _ = writeln!(out, "    {} -> {};", dot_id(&link.from), dot_id(&link.to));
    }
    for node in &graph.order {
        if let Some(edge) = graph.routers.get(node) {
            let id = node_id(node);
            let _ = writeln!(out, "    {} -> {}_condition [style=dashed, label=\"?\"];", dot_id(node), id);
            for to in edge.targets.as_deref().unwrap_or_default() {
                let _ = writeln!(out, "    {}_condition -> {} [style=dashed];", id, dot_id(to));
            }
        }
    }
    out.push_str("}\n");
    out
}

fn render_ascii<S: State>(graph: &GraphDef<S>, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    let title = options.title.as_deref().unwrap_or("Graph");
    let _ = writeln!(out, "{}\n{}", title, "=".repeat(title.chars().count()));
    let _ = writeln!(out, "START -> {}", display_name(&graph.entry));

    for node in &graph.order {
        let _ = writeln!(out, "\n[{}]", node);
        let mut any = false;
        for link in links(graph).into_iter().filter(|l| &l.from == node) {
            any = true;
            if link.conditional {
                let _ = writeln!(out, "  (?) -> {}", display_name(&link.to));
            } else {
                let _ = writeln!(out, "  -> {}", display_name(&link.to));
            }
        }
        if !any && graph.routers.contains_key(node) {
            out.push_str("  (?) -> any\n");
        }
    }
    out
}

fn display_name(node: &str) -> &str {
    match node {
        START => "START",
        END => "END",
        other => other,
    }
}

/// Mermaid-safe identifier: alphanumerics and underscores only
fn node_id(node: &str) -> String {
    match node {
        START => "START".to_string(),
        END => "END".to_string(),
        other => other
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect(),
    }
}

/// DOT identifiers are quoted unless they are the terminals
fn dot_id(node: &str) -> String {
    match node {
        START | END => node_id(node),
        other => format!("\"{}\"", escape_dot(other)),
    }
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;").replace('<', "&lt;").replace('>', "&gt;")
}

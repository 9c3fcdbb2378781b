//! Conditional routing over a typed state
//!
//! A router inspects the ticket and sends it to one of three handlers.
//! A second router loops `retry` until the ticket is resolved.

use flowgraph_core::{StateGraph, VisualizationOptions, END};

#[derive(Debug, Clone, Default)]
struct Ticket {
    subject: String,
    priority: u8,
    attempts: u32,
    resolved: bool,
    handled_by: Vec<String>,
}

fn handled(mut ticket: Ticket, by: &str) -> Ticket {
    ticket.handled_by.push(by.to_string());
    ticket
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("flowgraph_core=info").init();
    println!("=== Conditional Routing Example ===\n");

    let mut graph = StateGraph::<Ticket>::new();

    graph
        .add_node("triage", "classify the ticket", |_ctx, t| async move { Ok(handled(t, "triage")) })?
        .add_node("urgent", "page the on-call engineer", |_ctx, t| async move {
            let mut t = handled(t, "urgent");
            t.resolved = true;
            Ok(t)
        })?
        .add_node("normal", "queue for the support team", |_ctx, t| async move { Ok(handled(t, "normal")) })?
        .add_node("retry", "try an automated fix", |_ctx, t| async move {
            let mut t = handled(t, "retry");
            t.attempts += 1;
            t.resolved = t.attempts >= 3;
            Ok(t)
        })?
        .add_node("close", "close the ticket", |_ctx, t| async move { Ok(handled(t, "close")) })?;

    graph.set_entry_point("triage");
    graph.add_conditional_edge_with_targets(
        "triage",
        |_ctx, t: &Ticket| match t.priority {
            0..=1 => "normal",
            2 => "retry",
            _ => "urgent",
        },
        ["urgent", "normal", "retry"],
    )?;
    graph.add_conditional_edge_with_targets(
        "retry",
        |_ctx, t: &Ticket| if t.resolved { "close" } else { "retry" },
        ["retry", "close"],
    )?;
    graph
        .add_edge("urgent", "close")?
        .add_edge("normal", "close")?
        .add_edge("close", END)?;

    let compiled = graph.compile()?;
    println!("{}", compiled.visualize(&VisualizationOptions::mermaid()));

    for priority in [1, 2, 3] {
        let ticket = Ticket {
            subject: format!("printer on fire (p{priority})"),
            priority,
            ..Ticket::default()
        };
        let result = compiled.invoke(ticket).await?;
        println!(
            "{}: {} (attempts: {})",
            result.state.subject,
            result.state.handled_by.join(" -> "),
            result.state.attempts
        );
    }

    Ok(())
}

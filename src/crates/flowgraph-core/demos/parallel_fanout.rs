//! Fan-out / fan-in example
//!
//! `fetch` fans out to three analyzers that run concurrently and finish in
//! different orders. Their outputs are merged in the order the edges were
//! declared, so `findings` is the same on every run, before `report` runs
//! once.

use flowgraph_core::state::{AppendReducer, FieldSchema, SumReducer};
use flowgraph_core::{StateGraph, VisualizationOptions, END};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("flowgraph_core=debug").init();
    println!("=== Parallel Fan-out Example ===\n");

    let schema = FieldSchema::new()
        .with_field("findings", AppendReducer)
        .with_field("cost_ms", SumReducer);
    let mut graph = StateGraph::with_schema(schema);

    graph.add_node("fetch", "download the page", |_ctx, _s| async move {
        Ok(json!({ "page": "<html>...</html>", "cost_ms": 5 }))
    })?;

    for (name, delay_ms) in [("links", 30u64), ("spelling", 10), ("images", 20)] {
        graph.add_node(name, "analyze the page", move |_ctx, _s| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            println!("  {name} finished after {delay_ms}ms");
            Ok(json!({ "findings": [format!("{name}: ok")], "cost_ms": delay_ms }))
        })?;
        graph.add_edge("fetch", name)?.add_edge(name, "report")?;
    }

    graph.add_node("report", "summarize findings", |_ctx, s| async move {
        let count = s["findings"].as_array().map(Vec::len).unwrap_or(0);
        Ok(json!({ "report": format!("{count} checks passed") }))
    })?;
    graph.set_entry_point("fetch").add_edge("report", END)?;

    let compiled = graph.compile()?;
    println!("{}", compiled.visualize(&VisualizationOptions::dot()));

    let result = compiled.invoke(json!({ "findings": [], "cost_ms": 0 })).await?;
    println!("\nfindings: {}", result.state["findings"]);
    println!("total cost: {}ms", result.state["cost_ms"]);
    println!("{}", result.state["report"]);

    Ok(())
}

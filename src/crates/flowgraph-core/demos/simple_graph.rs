//! Simple graph example
//!
//! Three sequential steps over a JSON state. `log` is an append field, every
//! other field is overwritten by the node that returns it.

use flowgraph_core::state::{AppendReducer, FieldSchema};
use flowgraph_core::{StateGraph, VisualizationOptions, END};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("flowgraph_core=info").init();
    println!("=== Simple Graph Example ===\n");

    let mut graph = StateGraph::with_schema(FieldSchema::new().with_field("log", AppendReducer));

    graph
        .add_node("add_ten", "add 10 to value", |_ctx, state| async move {
            let value = state["value"].as_i64().unwrap_or(0);
            Ok(json!({ "value": value + 10, "log": ["add_ten"] }))
        })?
        .add_node("double", "double value", |_ctx, state| async move {
            let value = state["value"].as_i64().unwrap_or(0);
            Ok(json!({ "value": value * 2, "log": ["double"] }))
        })?
        .add_node("report", "describe the result", |_ctx, state| async move {
            let summary = format!("value is {}", state["value"]);
            Ok(json!({ "summary": summary, "log": ["report"] }))
        })?;

    graph
        .set_entry_point("add_ten")
        .add_edge("add_ten", "double")?
        .add_edge("double", "report")?
        .add_edge("report", END)?;

    let compiled = graph.compile()?;
    println!("{}", compiled.visualize(&VisualizationOptions::ascii()));

    let input = json!({ "value": 5, "log": [] });
    println!("Initial state: {}\n", input);

    let result = compiled.invoke(input).await?;

    println!("Final state: {}", result.state);
    println!("\nExpected: value = (5 + 10) * 2 = 30");
    println!("Actual: value = {}", result.state["value"]);

    Ok(())
}

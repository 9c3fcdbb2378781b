//! Streaming events while a run executes
//!
//! Prints node updates as they happen, then shows the metrics collected by
//! a `MetricsListener` attached to the same run.

use flowgraph_core::state::{AppendReducer, FieldSchema};
use flowgraph_core::{
    EventKind, LoggingListener, MetricsListener, NodeListener, RunConfig, StateGraph, StreamConfig, StreamMode, END,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("flowgraph_core=info").init();
    println!("=== Event Stream Example ===\n");

    let mut graph = StateGraph::with_schema(FieldSchema::new().with_field("log", AppendReducer));
    for (name, delay_ms) in [("extract", 20u64), ("transform", 40), ("load", 10)] {
        graph.add_node(name, "", move |_ctx, _s| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(json!({ "log": [name] }))
        })?;
    }
    graph
        .set_entry_point("extract")
        .add_edge("extract", "transform")?
        .add_edge("transform", "load")?
        .add_edge("load", END)?;
    graph.add_listener(Arc::new(LoggingListener::new()));
    let compiled = graph.compile()?;

    let metrics = MetricsListener::new();
    let listener: Arc<dyn NodeListener<Value>> = Arc::new(metrics.clone());
    let mut events = compiled
        .stream_with_config(
            json!({ "log": [] }),
            RunConfig::new().with_listener(listener),
            StreamConfig::new().with_mode(StreamMode::Updates),
        )
        .await?;

    while let Some(event) = events.next().await {
        match event.kind {
            EventKind::NodeComplete => println!(
                "{} done in {:?}, log = {}",
                event.node_name,
                event.duration.unwrap_or_default(),
                event.state["log"]
            ),
            EventKind::ChainEnd => println!("run finished: {}", event.state["log"]),
            other => println!("{:?} at {}", other, event.node_name),
        }
    }

    println!("\n{}", metrics.summary());
    Ok(())
}

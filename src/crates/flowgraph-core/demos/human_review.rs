//! Human-in-the-loop review
//!
//! `draft` writes a post, `review` asks a human for approval through a
//! dynamic interrupt, and a router either publishes or redrafts. The caller
//! answers each pause by resuming with a value.

use flowgraph_core::state::{AppendReducer, FieldSchema};
use flowgraph_core::{interrupt, InMemoryCheckpointStore, RunConfig, StateGraph, END};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("flowgraph_core=info").init();
    println!("=== Human Review Example ===\n");

    let mut graph = StateGraph::with_schema(FieldSchema::new().with_field("history", AppendReducer));
    graph.add_node("draft", "write a draft", |_ctx, s| async move {
        let revision = s["revision"].as_i64().unwrap_or(0) + 1;
        Ok(json!({ "revision": revision, "history": [format!("draft v{revision}")] }))
    })?;
    graph.add_node("review", "ask a human", |ctx, s| async move {
        let answer = interrupt(&ctx, json!({ "question": "approve?", "revision": s["revision"] }))?;
        let approved = answer.as_bool().unwrap_or(false);
        Ok(json!({ "approved": approved, "history": [format!("review: {approved}")] }))
    })?;
    graph.add_node("publish", "publish the post", |_ctx, _s| async move {
        Ok(json!({ "history": ["published"] }))
    })?;
    graph.set_entry_point("draft");
    graph.add_edge("draft", "review")?;
    graph.add_conditional_edge_with_targets(
        "review",
        |_ctx, s: &Value| if s["approved"] == json!(true) { "publish" } else { "draft" },
        ["publish", "draft"],
    )?;
    graph.add_edge("publish", END)?;

    let compiled = graph
        .compile()?
        .with_checkpointer(Arc::new(InMemoryCheckpointStore::<Value>::new()));

    // the reviewer rejects the first draft and accepts the second
    let mut answers = vec![json!(false), json!(true)].into_iter();
    let mut result = compiled
        .invoke_with_config(json!({ "history": [] }), RunConfig::for_thread("post-7"))
        .await?;

    while let Some(pause) = result.interrupt.clone() {
        println!("paused at {}: {}", pause.node, pause.value.as_ref().unwrap_or(&Value::Null));
        let answer = answers.next().unwrap_or(json!(true));
        println!("  answering {answer}");
        result = compiled
            .resume(pause.resume_config().with_resume_value(answer))
            .await?;
    }

    println!("\nhistory:");
    for entry in result.state["history"].as_array().into_iter().flatten() {
        println!("  {entry}");
    }

    Ok(())
}

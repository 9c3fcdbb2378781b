//! Crash recovery with a file-backed checkpoint store
//!
//! The first run fails at `charge`. Because every completed node was
//! checkpointed, the second attempt resumes at `charge` without repeating
//! `reserve`.

use flowgraph_core::state::{AppendReducer, FieldSchema};
use flowgraph_core::{FileCheckpointStore, NodeError, RunConfig, StateGraph, END};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("flowgraph_core=info").init();
    println!("=== Crash Recovery Example ===\n");

    let dir = std::env::temp_dir().join(format!("flowgraph-demo-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(FileCheckpointStore::<Value>::new(&dir));
    let gateway_up = Arc::new(AtomicBool::new(false));

    let mut graph = StateGraph::with_schema(FieldSchema::new().with_field("done", AppendReducer));
    graph.add_node("reserve", "reserve stock", |_ctx, _s| async move {
        println!("  reserving stock");
        Ok(json!({ "done": ["reserve"] }))
    })?;
    let up = Arc::clone(&gateway_up);
    graph.add_node("charge", "charge the card", move |_ctx, _s| {
        let up = up.load(Ordering::SeqCst);
        async move {
            if !up {
                println!("  payment gateway unavailable");
                return Err(NodeError::from("payment gateway unavailable"));
            }
            println!("  charging card");
            Ok(json!({ "done": ["charge"] }))
        }
    })?;
    graph.add_node("ship", "hand over to the carrier", |_ctx, _s| async move {
        println!("  shipping");
        Ok(json!({ "done": ["ship"] }))
    })?;
    graph
        .set_entry_point("reserve")
        .add_edge("reserve", "charge")?
        .add_edge("charge", "ship")?
        .add_edge("ship", END)?;

    let compiled = graph.compile()?.with_checkpointer(store);

    println!("First attempt:");
    let err = compiled
        .invoke_with_config(json!({ "done": [] }), RunConfig::for_thread("order-42"))
        .await
        .unwrap_err();
    println!("  failed: {err}\n");

    gateway_up.store(true, Ordering::SeqCst);

    println!("Recovery:");
    let Some(config) = compiled.recovery_config("order-42").await? else {
        anyhow::bail!("nothing to recover");
    };
    let result = compiled.resume(config).await?;
    println!("  completed: {}", result.state["done"]);

    println!("\nHistory (newest first):");
    for snapshot in compiled.get_state_history("order-42").await? {
        println!("  v{} after {} -> next {:?}", snapshot.version, snapshot.node_name, snapshot.next);
    }

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

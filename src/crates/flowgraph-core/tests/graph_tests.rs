//! Graph construction, validation, routing and merge semantics

use flowgraph_core::state::{AppendReducer, FieldSchema, MergeReducer, Reducer, SumReducer};
use flowgraph_core::{append, FnSchema, GraphError, StateGraph, StateSchema, VisualizationOptions, END};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;

fn pass(graph: &mut StateGraph<Value>, name: &str) {
    graph.add_node(name, "", |_ctx, s| async move { Ok(s) }).unwrap();
}

#[test]
fn test_compile_errors_in_order() {
    // nothing set
    let graph = StateGraph::<Value>::new();
    assert!(matches!(graph.compile(), Err(GraphError::NoEntryPoint)));

    // entry point not registered
    let mut graph = StateGraph::<Value>::new();
    graph.set_entry_point("ghost");
    assert!(matches!(graph.compile(), Err(GraphError::UnknownNode(n)) if n == "ghost"));

    // edge to unknown node
    let mut graph = StateGraph::<Value>::new();
    pass(&mut graph, "a");
    graph.set_entry_point("a");
    graph.add_edge("a", "b").unwrap();
    assert!(matches!(graph.compile(), Err(GraphError::UnknownNode(n)) if n == "b"));

    // island
    let mut graph = StateGraph::<Value>::new();
    pass(&mut graph, "a");
    pass(&mut graph, "island");
    graph.set_entry_point("a");
    graph.add_edge("a", END).unwrap();
    graph.add_edge("island", END).unwrap();
    assert!(matches!(graph.compile(), Err(GraphError::UnreachableNode(n)) if n == "island"));

    // dead end
    let mut graph = StateGraph::<Value>::new();
    pass(&mut graph, "a");
    pass(&mut graph, "b");
    graph.set_entry_point("a");
    graph.add_edge("a", "b").unwrap();
    assert!(matches!(graph.compile(), Err(GraphError::MissingEdge(n)) if n == "b"));

    // static plus conditional
    let mut graph = StateGraph::<Value>::new();
    pass(&mut graph, "a");
    graph.set_entry_point("a");
    graph.add_edge("a", END).unwrap();
    graph.add_conditional_edge("a", |_ctx, _s: &Value| END).unwrap();
    assert!(matches!(graph.compile(), Err(GraphError::AmbiguousEdge(n)) if n == "a"));

    // closed loop
    let mut graph = StateGraph::<Value>::new();
    pass(&mut graph, "a");
    pass(&mut graph, "b");
    graph.set_entry_point("a");
    graph.add_edge("a", "b").unwrap();
    graph.add_edge("b", "a").unwrap();
    assert!(matches!(graph.compile(), Err(GraphError::TerminalUnreachable)));
}

#[test]
fn test_concurrent_write_conflict() {
    let build = |schema: FieldSchema| {
        let mut graph = StateGraph::with_schema(schema);
        for name in ["split", "left", "right", "join"] {
            pass(&mut graph, name);
        }
        graph.set_entry_point("split");
        graph.add_edge("split", "left").unwrap();
        graph.add_edge("split", "right").unwrap();
        graph.add_edge("left", "join").unwrap();
        graph.add_edge("right", "join").unwrap();
        graph.add_edge("join", END).unwrap();
        graph.declare_writes("left", ["summary", "tags"]).unwrap();
        graph.declare_writes("right", ["summary"]).unwrap();
        graph
    };

    let err = build(FieldSchema::new()).compile().unwrap_err();
    match err {
        GraphError::ConcurrentWriteConflict { field, nodes } => {
            assert_eq!(field, "summary");
            assert_eq!(nodes, vec!["left", "right"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // a reducer on the field resolves the conflict
    assert!(build(FieldSchema::new().with_field("summary", AppendReducer))
        .compile()
        .is_ok());
}

#[tokio::test]
async fn test_sequential_runs_are_deterministic() {
    let mut graph = StateGraph::with_schema(FieldSchema::new().with_field("trace", AppendReducer));
    for name in ["parse", "validate", "store"] {
        graph
            .add_node(name, "", move |_ctx, _s| async move { Ok(json!({ "trace": [name] })) })
            .unwrap();
    }
    graph.set_entry_point("parse");
    graph.add_edge("parse", "validate").unwrap();
    graph.add_edge("validate", "store").unwrap();
    graph.add_edge("store", END).unwrap();
    let compiled = graph.compile().unwrap();

    let first = compiled.invoke(json!({ "trace": [] })).await.unwrap();
    for _ in 0..5 {
        let again = compiled.invoke(json!({ "trace": [] })).await.unwrap();
        assert_eq!(again.state, first.state);
    }
    assert_eq!(first.state["trace"], json!(["parse", "validate", "store"]));
}

#[tokio::test]
async fn test_fan_in_runs_once_after_all_branches() {
    let mut graph = StateGraph::with_schema(
        FieldSchema::new()
            .with_field("done", AppendReducer)
            .with_field("count", SumReducer),
    );
    graph
        .add_node("start", "", |_ctx, _s| async move { Ok(json!({})) })
        .unwrap();
    let branches = ["b0", "b1", "b2", "b3"];
    for (i, name) in branches.into_iter().enumerate() {
        // later branches finish first
        let delay = Duration::from_millis(((branches.len() - i) * 5) as u64);
        graph
            .add_node(name, "", move |_ctx, _s| async move {
                tokio::time::sleep(delay).await;
                Ok(json!({ "done": [name], "count": 1 }))
            })
            .unwrap();
        graph.add_edge("start", name).unwrap();
        graph.add_edge(name, "collect").unwrap();
    }
    graph
        .add_node("collect", "", |_ctx, s: Value| async move {
            let seen = s["done"].as_array().map_or(0, Vec::len);
            Ok(json!({ "collected": seen }))
        })
        .unwrap();
    graph.add_edge("collect", END).unwrap();
    graph.set_entry_point("start");

    let result = graph.compile().unwrap().invoke(json!({ "done": [], "count": 0 })).await.unwrap();
    assert_eq!(result.state["collected"], json!(4));
    assert_eq!(result.state["count"], json!(4));
    assert_eq!(result.state["done"], json!(["b0", "b1", "b2", "b3"]));
}

#[tokio::test]
async fn test_unreduced_field_last_branch_wins() {
    // without declared writes the compiler cannot see the overlap; branch
    // index order decides
    let mut graph = StateGraph::with_schema(FieldSchema::new());
    graph.add_node("split", "", |_ctx, _s| async move { Ok(json!({})) }).unwrap();
    graph
        .add_node("first", "", |_ctx, _s| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(json!({ "winner": "first" }))
        })
        .unwrap();
    graph
        .add_node("second", "", |_ctx, _s| async move { Ok(json!({ "winner": "second" })) })
        .unwrap();
    graph.add_node("join", "", |_ctx, _s| async move { Ok(json!({})) }).unwrap();
    graph.set_entry_point("split");
    graph.add_edge("split", "first").unwrap();
    graph.add_edge("split", "second").unwrap();
    graph.add_edge("first", "join").unwrap();
    graph.add_edge("second", "join").unwrap();
    graph.add_edge("join", END).unwrap();
    let compiled = graph.compile().unwrap();

    for _ in 0..3 {
        let result = compiled.invoke(json!({})).await.unwrap();
        assert_eq!(result.state["winner"], json!("second"));
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Ticket {
    priority: u8,
    handled_by: Vec<String>,
}

#[tokio::test]
async fn test_conditional_routing_by_priority() {
    let schema = FnSchema::new(|current: &Ticket, update: &Ticket| {
        Ok(Ticket {
            priority: update.priority.max(current.priority),
            handled_by: append(&current.handled_by, &update.handled_by),
        })
    })
    .with_reduced_fields(["handled_by"]);

    let mut graph = StateGraph::with_schema(schema);
    graph
        .add_node("triage", "", |_ctx, t: Ticket| async move {
            Ok(Ticket {
                priority: t.priority,
                handled_by: vec!["triage".into()],
            })
        })
        .unwrap();
    for team in ["oncall", "backlog"] {
        graph
            .add_node(team, "", move |_ctx, _t| async move {
                Ok(Ticket {
                    priority: 0,
                    handled_by: vec![team.to_string()],
                })
            })
            .unwrap();
        graph.add_edge(team, END).unwrap();
    }
    graph
        .add_conditional_edge_with_targets(
            "triage",
            |_ctx, t: &Ticket| if t.priority >= 8 { "oncall" } else { "backlog" },
            ["oncall", "backlog"],
        )
        .unwrap();
    graph.set_entry_point("triage");
    let compiled = graph.compile().unwrap();

    let urgent = compiled
        .invoke(Ticket {
            priority: 9,
            handled_by: vec![],
        })
        .await
        .unwrap();
    assert_eq!(urgent.state.handled_by, vec!["triage", "oncall"]);
    assert_eq!(urgent.state.priority, 9);

    let routine = compiled
        .invoke(Ticket {
            priority: 2,
            handled_by: vec![],
        })
        .await
        .unwrap();
    assert_eq!(routine.state.handled_by, vec!["triage", "backlog"]);
}

#[tokio::test]
async fn test_router_loop_until_done() {
    let mut graph = StateGraph::<u32>::new();
    graph.add_node("retry", "", |_ctx, n| async move { Ok(n + 1) }).unwrap();
    graph
        .add_conditional_edge_with_targets("retry", |_ctx, n: &u32| if *n < 3 { "retry" } else { END }, ["retry", END])
        .unwrap();
    graph.set_entry_point("retry");

    let result = graph.compile().unwrap().invoke(0).await.unwrap();
    assert_eq!(result.state, 3);
}

#[test]
fn test_visualize_compiled_graph() {
    let mut graph = StateGraph::<Value>::new();
    pass(&mut graph, "load");
    pass(&mut graph, "check");
    graph.set_entry_point("load");
    graph.add_edge("load", "check").unwrap();
    graph
        .add_conditional_edge_with_targets("check", |_ctx, _s: &Value| END, ["load", END])
        .unwrap();
    let compiled = graph.compile().unwrap();

    let mermaid = compiled.visualize(&VisualizationOptions::mermaid());
    assert!(mermaid.contains("load --> check"));
    assert!(mermaid.contains("check -.-> check_condition((?))"));
    assert!(mermaid.contains("check_condition -.-> END"));

    let dot = compiled.visualize(&VisualizationOptions::dot());
    assert!(dot.contains("\"check\" -> check_condition [style=dashed, label=\"?\"];"));
}

fn small_array() -> impl Strategy<Value = Value> {
    prop::collection::vec(0i64..100, 0..5).prop_map(|v| json!(v))
}

proptest! {
    #[test]
    fn prop_append_is_associative(a in small_array(), b in small_array(), c in small_array()) {
        let left = AppendReducer.reduce(&AppendReducer.reduce(&a, &b).unwrap(), &c).unwrap();
        let right = AppendReducer.reduce(&a, &AppendReducer.reduce(&b, &c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn prop_append_length_adds_up(a in small_array(), b in small_array()) {
        let merged = AppendReducer.reduce(&a, &b).unwrap();
        let len = |v: &Value| v.as_array().map_or(0, Vec::len);
        prop_assert_eq!(len(&merged), len(&a) + len(&b));
    }

    #[test]
    fn prop_sum_is_associative(a in any::<i64>(), b in any::<i64>(), c in any::<i64>()) {
        let fits = |n: i128| n >= i128::from(i64::MIN) && n <= i128::from(u64::MAX);
        let (x, y, z) = (i128::from(a), i128::from(b), i128::from(c));
        let (a, b, c) = (json!(a), json!(b), json!(c));
        let left = SumReducer.reduce(&a, &b).and_then(|ab| SumReducer.reduce(&ab, &c));
        let right = SumReducer.reduce(&b, &c).and_then(|bc| SumReducer.reduce(&a, &bc));

        if fits(x + y) && fits(x + y + z) {
            prop_assert!(left.is_ok());
        }
        if fits(y + z) && fits(x + y + z) {
            prop_assert!(right.is_ok());
        }
        if let (Ok(left), Ok(right)) = (left, right) {
            let total = left.as_i64().map(i128::from).or_else(|| left.as_u64().map(i128::from));
            prop_assert_eq!(total, Some(x + y + z));
            prop_assert_eq!(left, right);
        }
    }

    #[test]
    fn prop_merge_later_keys_win(x in 0i64..10, y in 0i64..10) {
        let merged = MergeReducer.reduce(&json!({"k": x, "a": 1}), &json!({"k": y})).unwrap();
        prop_assert_eq!(merged, json!({"k": y, "a": 1}));
    }

    #[test]
    fn prop_field_schema_typed_append(xs in prop::collection::vec(0u8..10, 0..6)) {
        let schema = FieldSchema::new().with_field("xs", AppendReducer);
        let mut state = json!({"xs": []});
        for x in &xs {
            state = schema.update(&state, &json!({"xs": [x]})).unwrap();
        }
        prop_assert_eq!(state["xs"].clone(), json!(xs));
    }
}

#[tokio::test]
async fn test_engine_config_from_yaml() {
    let config = flowgraph_core::EngineConfig::from_yaml_str(
        "recursion_limit: 3\ninterrupt:\n  interrupt_before: [b]\n",
    )
    .unwrap();

    let mut graph = StateGraph::<u32>::new();
    graph.add_node("a", "", |_ctx, n| async move { Ok(n + 1) }).unwrap();
    graph.add_node("b", "", |_ctx, n| async move { Ok(n * 10) }).unwrap();
    graph.set_entry_point("a");
    graph
        .add_conditional_edge_with_targets("a", |_ctx, n: &u32| if *n < 10 { "a" } else { "b" }, ["a", "b"])
        .unwrap();
    graph.add_edge("b", END).unwrap();
    let compiled = graph.compile().unwrap().with_engine_config(config);

    // the loop would need ten steps, the limit allows three
    let err = compiled.invoke(0).await.unwrap_err();
    assert!(matches!(err, GraphError::RecursionLimit(3)));

    let paused = compiled.invoke(8).await.unwrap();
    assert!(paused.is_interrupted());
    assert_eq!(paused.state, 10);
    assert_eq!(paused.interrupt.unwrap().node, "b");
}

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowgraph_checkpoint::{CheckpointDraft, CheckpointStore, InMemoryCheckpointStore};
use serde_json::json;

fn checkpoint_append_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint append", |b| {
        b.to_async(&runtime).iter(|| async {
            let store = InMemoryCheckpointStore::new();
            let draft = CheckpointDraft::new("bench-thread", "node", json!({"n": 1}));

            store.append(black_box(draft)).await.unwrap();
        });
    });
}

fn checkpoint_list_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryCheckpointStore::new();
    runtime.block_on(async {
        for i in 0..100 {
            store
                .append(CheckpointDraft::new("bench-thread", "node", json!({"n": i})))
                .await
                .unwrap();
        }
    });

    c.bench_function("checkpoint list 100", |b| {
        b.to_async(&runtime).iter(|| async {
            store.list_by_thread(black_box("bench-thread")).await.unwrap();
        });
    });
}

criterion_group!(benches, checkpoint_append_benchmark, checkpoint_list_benchmark);
criterion_main!(benches);

//! Behavioral tests shared by every checkpoint backend

use flowgraph_checkpoint::{
    Checkpoint, CheckpointDraft, CheckpointError, CheckpointMetadata, CheckpointSource,
    CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn sample(thread: &str, node: &str, version: u64) -> Checkpoint<Value> {
    Checkpoint::new(thread, node, json!({"node": node, "items": [1, 2, 3]}), version).with_metadata(
        CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(version)
            .with_next(vec!["next".to_string()])
            .with_extra("custom", json!({"k": "v"})),
    )
}

async fn assert_round_trip(store: &dyn CheckpointStore<Value>) {
    let checkpoint = sample("thread-rt", "A", 1);
    store.save(checkpoint.clone()).await.unwrap();

    let loaded = store.load(&checkpoint.id).await.unwrap();
    assert_eq!(loaded, checkpoint);
}

async fn assert_ascending_list(store: &dyn CheckpointStore<Value>) {
    for version in [2, 5, 1, 4, 3] {
        store.save(sample("thread-list", "n", version)).await.unwrap();
    }
    store.save(sample("other-thread", "n", 1)).await.unwrap();

    let listed = store.list_by_thread("thread-list").await.unwrap();
    let versions: Vec<u64> = listed.iter().map(|c| c.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    assert!(listed.iter().all(|c| c.thread_id == "thread-list"));

    let latest = store.latest("thread-list").await.unwrap().unwrap();
    assert_eq!(latest.version, 5);
}

async fn assert_conflict_and_append(store: &dyn CheckpointStore<Value>) {
    store.save(sample("thread-c", "A", 1)).await.unwrap();
    let err = store.save(sample("thread-c", "B", 1)).await.unwrap_err();
    assert!(matches!(err, CheckpointError::VersionConflict { version: 1, .. }));

    let appended = store
        .append(CheckpointDraft::new("thread-c", "C", json!({"x": 1})))
        .await
        .unwrap();
    assert_eq!(appended.version, 2);
    assert_eq!(appended.node_name, "C");
}

async fn assert_delete(store: &dyn CheckpointStore<Value>) {
    store.save(sample("thread-d", "A", 1)).await.unwrap();
    store.save(sample("keep", "A", 1)).await.unwrap();

    store.delete_by_thread("thread-d").await.unwrap();
    store.delete_by_thread("never-existed").await.unwrap();

    assert!(store.list_by_thread("thread-d").await.unwrap().is_empty());
    assert_eq!(store.list_by_thread("keep").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = InMemoryCheckpointStore::<Value>::new();
    assert_round_trip(&store).await;
    assert_ascending_list(&store).await;
    assert_conflict_and_append(&store).await;
    assert_delete(&store).await;
}

#[tokio::test]
async fn test_file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::<Value>::new(dir.path());
    assert_round_trip(&store).await;
    assert_ascending_list(&store).await;
    assert_conflict_and_append(&store).await;
    assert_delete(&store).await;
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let saved = {
        let store = FileCheckpointStore::<Value>::new(dir.path());
        store
            .append(CheckpointDraft::new("durable", "A", json!({"step": "A"})))
            .await
            .unwrap()
    };

    let reopened = FileCheckpointStore::<Value>::new(dir.path());
    let latest = reopened.latest("durable").await.unwrap().unwrap();
    assert_eq!(latest, saved);
}

#[tokio::test]
async fn test_file_store_missing_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::<Value>::new(dir.path().join("not-created"));
    let err = store.load("checkpoint_nope").await.unwrap_err();
    assert!(matches!(err, CheckpointError::NotFound(_)));
}

#[tokio::test]
async fn test_file_store_load_ignores_unrelated_corrupt_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::<Value>::new(dir.path());
    let saved = store
        .append(CheckpointDraft::new("healthy", "A", json!({"step": "A"})))
        .await
        .unwrap();

    let broken = dir.path().join("broken");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("v0000000001.json"), b"{ not json").unwrap();

    assert_eq!(store.load(&saved.id).await.unwrap(), saved);
    let reopened = FileCheckpointStore::<Value>::new(dir.path());
    assert_eq!(reopened.load(&saved.id).await.unwrap(), saved);

    // without the index, the scan skips the bad file
    std::fs::remove_dir_all(dir.path().join(".index")).unwrap();
    assert_eq!(reopened.load(&saved.id).await.unwrap(), saved);
    assert!(matches!(
        reopened.load("checkpoint_nope").await.unwrap_err(),
        CheckpointError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_file_store_delete_drops_index_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::<Value>::new(dir.path());
    let gone = store
        .append(CheckpointDraft::new("short-lived", "A", json!(1)))
        .await
        .unwrap();
    let kept = store
        .append(CheckpointDraft::new("long-lived", "A", json!(2)))
        .await
        .unwrap();

    store.delete_by_thread("short-lived").await.unwrap();

    assert!(matches!(store.load(&gone.id).await.unwrap_err(), CheckpointError::NotFound(_)));
    assert_eq!(store.load(&kept.id).await.unwrap(), kept);
    let entries: Vec<_> = std::fs::read_dir(dir.path().join(".index"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_file_store_concurrent_appends() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::<Value>::new(dir.path()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .append(CheckpointDraft::new("race", "n", json!(i)))
                .await
                .unwrap()
                .version
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u64>>());
}

proptest! {
    #[test]
    fn prop_memory_round_trip(
        thread in "[a-z]{1,8}",
        node in "[a-z_]{1,12}",
        values in proptest::collection::vec(any::<i64>(), 0..16),
        version in 1u64..1000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = InMemoryCheckpointStore::<Vec<i64>>::new();
            let checkpoint = Checkpoint::new(thread.clone(), node.clone(), values.clone(), version);
            store.save(checkpoint.clone()).await.unwrap();

            let loaded = store.load(&checkpoint.id).await.unwrap();
            prop_assert_eq!(loaded, checkpoint);
            Ok(())
        })?;
    }
}

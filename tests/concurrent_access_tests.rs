/// Concurrent access tests
///
/// Writers to one file are serialized by the shared lock registry.
/// Run with: cargo test --test concurrent_access_tests

use futures::future::join_all;
use rolnodb::core::types::{into_record, record_id};
use rolnodb::{CollectionShape, JsonCollection, LockRegistry};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_get_distinct_ids() {
    let temp_dir = TempDir::new().unwrap();
    let collection = Arc::new(JsonCollection::new(
        "test",
        temp_dir.path().join("test.json"),
        CollectionShape::Array,
        Arc::new(LockRegistry::new()),
    ));
    collection.initialize().await.unwrap();

    let mut handles = vec![];
    for i in 0..10 {
        let collection = Arc::clone(&collection);
        handles.push(tokio::spawn(async move {
            collection
                .add(into_record(json!({"n": i})).unwrap())
                .await
                .unwrap()
        }));
    }

    let ids: BTreeSet<u64> = join_all(handles)
        .await
        .into_iter()
        .map(|created| record_id(&created.unwrap()).unwrap())
        .collect();

    assert_eq!(ids, (1..=10).collect::<BTreeSet<_>>());
    assert_eq!(collection.count().unwrap(), 10);

    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(collection.path()).unwrap()).unwrap();
    assert_eq!(on_disk.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_clear_all_unblocks_waiting_writer() {
    let temp_dir = TempDir::new().unwrap();
    let locks = Arc::new(LockRegistry::new());
    let collection = Arc::new(JsonCollection::new(
        "docs",
        temp_dir.path().join("docs.json"),
        CollectionShape::Array,
        Arc::clone(&locks),
    ));
    collection.initialize().await.unwrap();

    // a holder that never lets go
    let leaked = locks.acquire(collection.path()).await.unwrap();

    let writer = {
        let collection = Arc::clone(&collection);
        tokio::spawn(async move { collection.add(into_record(json!({"t": 1})).unwrap()).await })
    };
    tokio::task::yield_now().await;
    assert!(!writer.is_finished());

    assert_eq!(locks.clear_all().unwrap(), 1);
    let created = writer.await.unwrap().unwrap();
    assert_eq!(record_id(&created), Some(1));
    drop(leaked);
}

//! Waiting queue persisted through the file store.

use std::sync::Arc;

use syncbridge_core::{CommitAction, CommitEvent};
use syncbridge_store::{record, storage_key, BlobStore, FileStore, WaitingStore};
use tempfile::tempdir;

fn event(id: &str) -> CommitEvent {
    CommitEvent::new("Product", vec![id.to_string()], CommitAction::Update, "admin", "", 1_000)
}

#[tokio::test]
async fn queue_survives_reopen() {
    let dir = tempdir().unwrap();
    let key = storage_key("connector-1", "https://sync.example.com");

    let first = WaitingStore::new(Arc::new(FileStore::new(dir.path())), key.clone());
    first.upsert(event("1")).await.unwrap();
    first.upsert(event("2")).await.unwrap();
    first.upsert(event("1")).await.unwrap();

    let reopened = WaitingStore::new(Arc::new(FileStore::new(dir.path())), key);
    let events = reopened.load_all().await.unwrap();
    let ids: Vec<_> = events.values().map(|e| e.local_ids[0].clone()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn torn_write_loses_only_trailing_record() {
    let dir = tempdir().unwrap();
    let files = FileStore::new(dir.path());
    let queue = WaitingStore::new(Arc::new(files.clone()), "queue");
    for id in ["1", "2", "3"] {
        queue.upsert(event(id)).await.unwrap();
    }

    let path = files.path_for("queue").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

    let events = queue.load_all().await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.values().all(|e| e.local_ids[0] != "3"));
}

#[tokio::test]
async fn legacy_file_is_rewritten_in_record_format() {
    let dir = tempdir().unwrap();
    let files = FileStore::new(dir.path());
    let path = files.path_for("queue").unwrap();
    std::fs::write(
        &path,
        "{\"type\":\"Product\",\"id\":4,\"action\":\"create\"}\n{broken\n",
    )
    .unwrap();

    let queue = WaitingStore::new(Arc::new(files.clone()), "queue");
    let events = queue.load_all().await.unwrap();
    assert_eq!(events.len(), 1);

    let raw = files.load("queue").await.unwrap().unwrap();
    assert!(record::is_record_file(&raw));
    assert_eq!(record::decode_records(&raw).unwrap().events.len(), 1);
}

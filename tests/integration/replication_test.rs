//! ReplicationSync against in-memory mirror and primary store

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

use studysync::backend::replication::{
    BackupStatus, MemoryMirror, MemorySource, MirrorStore, PrimarySource, ReplicationSync, METADATA_COLLECTION,
};
use studysync::shared::{AppConfig, DEFAULT_COLLECTIONS};

use crate::common::{user, RejectingMirror};

fn sync_over(mirror: Arc<dyn MirrorStore>, source: Option<Arc<MemorySource>>, collections: &[&str]) -> ReplicationSync {
    ReplicationSync::with_mirror(
        Some(mirror),
        source.map(|s| s as Arc<dyn PrimarySource>),
        collections.iter().map(|c| c.to_string()).collect(),
    )
}

#[tokio::test]
async fn test_repeated_sync_converges_on_one_record() {
    let mirror = Arc::new(MemoryMirror::new());
    let sync = sync_over(mirror.clone(), None, &["users"]);

    assert!(sync.sync_record("users", &user("u1", "A")).await);
    assert!(sync.sync_record("users", &user("u1", "B")).await);

    assert_eq!(mirror.count("users").await, 1);
    let record = mirror.get("users", "u1").await.unwrap();
    assert_eq!(record["name"], "B");
    assert_eq!(record["_originalId"], "u1");
    assert_eq!(record["_source"], "postgresql");
    assert!(record.get("id").is_none());
}

#[tokio::test]
async fn test_invalid_record_is_reported_not_raised() {
    let mirror = Arc::new(MemoryMirror::new());
    let sync = sync_over(mirror.clone(), None, &["users"]);

    assert!(!sync.sync_record("users", &json!({"name": "no id"})).await);
    assert_eq!(mirror.count("users").await, 0);
}

#[tokio::test]
async fn test_bulk_sync_and_delete() {
    let mirror = Arc::new(MemoryMirror::new());
    let sync = sync_over(mirror.clone(), None, &["users"]);

    let synced = sync
        .sync_bulk("users", &[user("u1", "A"), user("u2", "B"), user("u1", "C")])
        .await;
    assert_eq!(synced, 3);
    assert_eq!(mirror.count("users").await, 2);
    assert_eq!(mirror.get("users", "u1").await.unwrap()["name"], "C");

    assert!(sync.delete_record("users", "u2").await);
    assert!(!sync.delete_record("users", "u2").await);
    assert_eq!(mirror.count("users").await, 1);
}

#[tokio::test]
async fn test_full_backup_without_mirror_creates_no_metadata() {
    let source = Arc::new(MemorySource::new());
    source.insert("users", vec![user("u1", "A")]).await;
    let sync = ReplicationSync::with_mirror(
        None,
        Some(source as Arc<dyn PrimarySource>),
        vec!["users".to_string()],
    );

    assert!(!sync.full_backup().await);
}

#[tokio::test]
async fn test_unconfigured_init_disables_everything() {
    let sync = ReplicationSync::init(&AppConfig::default(), None).await;

    assert!(!sync.is_configured().await);
    assert!(!sync.full_backup().await);
    assert!(!sync.export_to_json("/tmp/never-written.json").await);
    assert_eq!(sync.collections().len(), DEFAULT_COLLECTIONS.len());
}

#[tokio::test]
async fn test_full_backup_mirrors_every_collection() {
    let mirror = Arc::new(MemoryMirror::new());
    let source = Arc::new(MemorySource::new());
    source.insert("users", vec![user("u1", "A"), user("u2", "B")]).await;
    source
        .insert("tasks", vec![json!({"id": 1, "title": "read"}), json!({"title": "no id"})])
        .await;

    let sync = sync_over(mirror.clone(), Some(source), &["users", "tasks", "forms"]);
    assert!(sync.full_backup().await);

    assert_eq!(mirror.count("users").await, 2);
    assert_eq!(mirror.count("tasks").await, 1);
    assert!(mirror.get("tasks", "1").await.is_some());

    let history = mirror.backup_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, BackupStatus::Completed);
    assert_eq!(history[0].collections, vec!["users", "tasks", "forms"]);
    assert!(history[0].failed.is_empty());
}

#[tokio::test]
async fn test_failing_collection_does_not_stop_backup() {
    let inner = Arc::new(MemoryMirror::new());
    let mirror = Arc::new(RejectingMirror {
        inner: inner.clone(),
        rejected_collection: "tasks".to_string(),
    });
    let source = Arc::new(MemorySource::new());
    source.insert("users", vec![user("u1", "A")]).await;
    source.insert("tasks", vec![json!({"id": "t1"})]).await;
    source.insert("forms", vec![json!({"id": "f1"})]).await;

    let sync = sync_over(mirror, Some(source), &["users", "tasks", "forms"]);
    assert!(!sync.full_backup().await);

    assert_eq!(inner.count("users").await, 1);
    assert_eq!(inner.count("forms").await, 1);

    let history = inner.backup_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, BackupStatus::Partial);
    assert_eq!(history[0].collections, vec!["users", "forms"]);
    assert_eq!(history[0].failed, vec!["tasks"]);
}

#[tokio::test]
async fn test_export_writes_non_internal_collections() {
    let mirror = Arc::new(MemoryMirror::new());
    let source = Arc::new(MemorySource::new());
    source.insert("users", vec![user("u1", "A")]).await;
    let sync = sync_over(mirror.clone(), Some(source), &["users"]);
    assert!(sync.full_backup().await);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exports").join("mirror.json");
    assert!(sync.export_to_json(&path).await);

    let raw = std::fs::read_to_string(&path).unwrap();
    let dump: Value = serde_json::from_str(&raw).unwrap();
    let object = dump.as_object().unwrap();

    assert!(object.contains_key("users"));
    assert!(!object.contains_key(METADATA_COLLECTION));
    assert_eq!(dump["users"][0]["_originalId"], "u1");
}

#[tokio::test]
async fn test_restore_always_reports_unsupported() {
    let mirror = Arc::new(MemoryMirror::new());
    let sync = sync_over(mirror, None, &["users"]);
    assert!(!sync.restore().await);
}

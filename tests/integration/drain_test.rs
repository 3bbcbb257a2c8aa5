//! Write-behind queue draining into a sink

use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use studysync::backend::cache::{CacheClient, CacheSettings, QueueDrainer};

use crate::common::{message, RecordingSink};

fn setup() -> (Arc<CacheClient>, Arc<RecordingSink>, Arc<QueueDrainer>) {
    let cache = Arc::new(CacheClient::in_process(CacheSettings::default()));
    let sink = Arc::new(RecordingSink::default());
    let drainer = Arc::new(QueueDrainer::new(Arc::clone(&cache), sink.clone()));
    (cache, sink, drainer)
}

#[tokio::test]
async fn test_drain_persists_in_fifo_order() {
    let (cache, sink, drainer) = setup();
    for id in ["a", "b", "c"] {
        cache.cache_message("r1", message(id, "r1")).await;
    }

    assert_eq!(drainer.drain_once().await.unwrap(), 3);
    assert_eq!(*sink.persisted.lock().await, vec!["a", "b", "c"]);
    assert_eq!(cache.get_stats().await.queued_message_count, 0);
}

#[tokio::test]
async fn test_failed_drain_keeps_messages_queued() {
    let (cache, sink, drainer) = setup();
    cache.cache_message("r1", message("a", "r1")).await;

    sink.failing.store(true, Ordering::SeqCst);
    assert!(drainer.drain_once().await.is_err());
    assert_eq!(cache.get_stats().await.queued_message_count, 1);

    sink.failing.store(false, Ordering::SeqCst);
    assert_eq!(drainer.drain_once().await.unwrap(), 1);
    assert_eq!(*sink.persisted.lock().await, vec!["a"]);
}

#[tokio::test]
async fn test_removed_message_is_never_persisted() {
    let (cache, sink, drainer) = setup();
    cache.cache_message("r1", message("a", "r1")).await;
    cache.cache_message("r1", message("b", "r1")).await;
    cache.remove_message("r1", "a").await;

    drainer.drain_once().await.unwrap();
    assert_eq!(*sink.persisted.lock().await, vec!["b"]);
}

#[tokio::test(start_paused = true)]
async fn test_background_drain_runs_each_interval() {
    let (cache, sink, drainer) = setup();
    let handle = QueueDrainer::spawn(drainer, Duration::from_secs(5));

    cache.cache_message("r1", message("a", "r1")).await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    cache.cache_message("r1", message("b", "r1")).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(*sink.persisted.lock().await, vec!["a", "b"]);
    handle.stop().await;
}

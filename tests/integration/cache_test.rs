//! CacheClient behavior across both backends

use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use studysync::backend::cache::{CacheClient, CacheSettings, ChatStore, DEFAULT_MESSAGE_LIMIT};
use studysync::shared::AppConfig;

use crate::common::{ids, message, SwitchableStore};

const RECONNECT_EVERY: Duration = Duration::from_secs(15);

async fn client_over(store: &Arc<SwitchableStore>) -> CacheClient {
    CacheClient::with_fast_path(
        Arc::clone(store) as Arc<dyn ChatStore>,
        CacheSettings::default(),
        RECONNECT_EVERY,
    )
    .await
}

#[tokio::test]
async fn test_recent_messages_newest_first() {
    let cache = CacheClient::init(&AppConfig::default()).await;
    for id in ["m1", "m2", "m3", "m4", "m5"] {
        cache.cache_message("r1", message(id, "r1")).await;
    }

    assert_eq!(ids(&cache.get_cached_messages("r1", 3).await), vec!["m5", "m4", "m3"]);
}

#[tokio::test]
async fn test_room_list_evicts_oldest_past_limit() {
    let cache = CacheClient::init(&AppConfig::default()).await;
    for i in 1..=101 {
        cache.cache_message("r1", message(&format!("m{}", i), "r1")).await;
    }

    let messages = cache.get_cached_messages("r1", 100).await;
    assert_eq!(messages.len(), 100);
    assert_eq!(messages[0].id, "m101");
    assert_eq!(messages[99].id, "m2");
    assert_eq!(cache.get_cached_messages("r1", DEFAULT_MESSAGE_LIMIT).await.len(), 50);
}

#[tokio::test]
async fn test_healthy_fast_path_serves_calls() {
    let store = SwitchableStore::healthy();
    let cache = client_over(&store).await;
    assert!(cache.is_connected());
    assert!(cache.is_using_fast_path());

    cache.cache_message("r1", message("m1", "r1")).await;
    assert_eq!(ids(&store.inner().get_messages("r1", 10).await.unwrap()), vec!["m1"]);
    assert_eq!(ids(&cache.get_cached_messages("r1", 10).await), vec!["m1"]);
}

#[tokio::test]
async fn test_unreachable_fast_path_starts_on_fallback() {
    let store = SwitchableStore::down();
    let cache = client_over(&store).await;

    assert!(!cache.is_connected());
    assert!(!cache.is_using_fast_path());

    cache.cache_message("r1", message("m1", "r1")).await;
    cache.add_online_user("u1", "socket-1").await;

    assert_eq!(ids(&cache.get_cached_messages("r1", 10).await), vec!["m1"]);
    assert_eq!(cache.get_online_users().await, HashSet::from(["u1".to_string()]));
    assert_eq!(store.served_calls(), 0);
    assert_eq!(cache.get_message_queue().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_loss_flips_to_fallback_until_ping_succeeds() {
    let store = SwitchableStore::healthy();
    let cache = client_over(&store).await;

    store.go_down();
    cache.cache_message("r1", message("m1", "r1")).await;
    assert!(!cache.is_using_fast_path());
    assert!(cache.is_connected());

    // still down at the first ping
    tokio::time::sleep(RECONNECT_EVERY + Duration::from_secs(1)).await;
    assert!(!cache.is_using_fast_path());

    store.go_up();
    tokio::time::sleep(RECONNECT_EVERY).await;
    assert!(cache.is_using_fast_path());

    cache.cache_message("r1", message("m2", "r1")).await;
    assert_eq!(ids(&store.inner().get_messages("r1", 10).await.unwrap()), vec!["m2"]);
}

#[tokio::test]
async fn test_non_connection_error_falls_back_for_one_call_only() {
    let store = SwitchableStore::healthy();
    let cache = client_over(&store).await;

    store.break_responses();
    cache.cache_message("r1", message("m1", "r1")).await;
    assert!(cache.is_using_fast_path());

    store.go_up();
    cache.cache_message("r1", message("m2", "r1")).await;
    assert_eq!(ids(&store.inner().get_messages("r1", 10).await.unwrap()), vec!["m2"]);
}

#[tokio::test(start_paused = true)]
async fn test_removed_message_never_returns_from_either_backend() {
    let store = SwitchableStore::down();
    let cache = client_over(&store).await;

    // m1 lands in the fallback, m2 in the fast path
    cache.cache_message("r1", message("m1", "r1")).await;
    store.go_up();
    tokio::time::sleep(RECONNECT_EVERY + Duration::from_secs(1)).await;
    assert!(cache.is_using_fast_path());
    cache.cache_message("r1", message("m2", "r1")).await;

    cache.remove_message("r1", "m1").await;
    cache.remove_message("r1", "m2").await;
    assert!(cache.get_cached_messages("r1", 10).await.is_empty());

    store.go_down();
    assert!(cache.get_cached_messages("r1", 10).await.is_empty());
    assert!(cache.get_message_queue().await.is_empty());
}

#[tokio::test]
async fn test_update_preserves_position_and_queue_entry() {
    let cache = CacheClient::in_process(CacheSettings::default());
    for id in ["m1", "m2", "m3"] {
        cache.cache_message("r1", message(id, "r1")).await;
    }

    cache.update_message("r1", "m2", "edited").await;

    let messages = cache.get_cached_messages("r1", 10).await;
    assert_eq!(ids(&messages), vec!["m3", "m2", "m1"]);
    assert_eq!(messages[1].body, "edited");
    assert_eq!(messages[0].body, "message m3");

    let queued = cache.get_message_queue().await;
    assert_eq!(queued[1].body, "edited");
}

#[tokio::test(start_paused = true)]
async fn test_typing_marker_expires_on_fallback() {
    let cache = CacheClient::in_process(CacheSettings::default());
    cache.set_typing("r1", "u1", true).await;
    assert!(cache.get_typing_users("r1").await.contains("u1"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!cache.get_typing_users("r1").await.contains("u1"));
}

#[tokio::test]
async fn test_stop_typing_and_presence_removal() {
    let cache = CacheClient::in_process(CacheSettings::default());
    cache.set_typing("r1", "u1", true).await;
    cache.set_typing("r1", "u1", false).await;
    assert!(cache.get_typing_users("r1").await.is_empty());

    cache.add_online_user("u1", "s1").await;
    cache.add_online_user("u2", "s2").await;
    cache.remove_online_user("u1").await;
    assert_eq!(cache.get_online_users().await, HashSet::from(["u2".to_string()]));
}

#[tokio::test]
async fn test_message_queue_drain_is_exclusive() {
    let cache = CacheClient::in_process(CacheSettings::default());
    cache.cache_message("r1", message("m1", "r1")).await;

    let first = cache.get_message_queue().await;
    cache.cache_message("r1", message("m2", "r1")).await;
    let second = cache.get_message_queue().await;

    assert_eq!(ids(&first), vec!["m1"]);
    assert_eq!(ids(&second), vec!["m2"]);
    assert!(cache.get_message_queue().await.is_empty());
}

#[tokio::test]
async fn test_clear_message_queue_keeps_room_list() {
    let cache = CacheClient::in_process(CacheSettings::default());
    cache.cache_message("r1", message("m1", "r1")).await;
    cache.clear_message_queue().await;

    assert!(cache.get_message_queue().await.is_empty());
    assert_eq!(cache.get_cached_messages("r1", 10).await.len(), 1);
    assert_eq!(cache.get_stats().await.queued_message_count, 0);
}

#[tokio::test]
async fn test_close_stops_using_fast_path() {
    let store = SwitchableStore::healthy();
    let cache = client_over(&store).await;
    cache.close().await;

    let served = store.served_calls();
    cache.cache_message("r1", message("m1", "r1")).await;
    assert_eq!(store.served_calls(), served);
    assert!(!cache.get_stats().await.using_fast_path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_on_one_room() {
    let store = SwitchableStore::healthy();
    let cache = Arc::new(client_over(&store).await);

    let writers: Vec<_> = (0..8)
        .map(|writer| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let mut removed = Vec::new();
                for i in 0..60 {
                    let id = format!("w{}-m{}", writer, i);
                    cache.cache_message("r1", message(&id, "r1")).await;
                    cache.update_message("r1", &id, "edited").await;
                    if i % 3 == 2 {
                        let previous = format!("w{}-m{}", writer, i - 1);
                        cache.remove_message("r1", &previous).await;
                        removed.push(previous);
                    }
                }
                removed
            })
        })
        .collect();

    let mut removed = HashSet::new();
    for writer in writers {
        removed.extend(writer.await.unwrap());
    }

    let served = cache.get_cached_messages("r1", 200).await;
    let on_fast_path = store.inner().get_messages("r1", 200).await.unwrap();
    for list in [&served, &on_fast_path] {
        assert!(list.len() <= 100);
        let unique: HashSet<&str> = list.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(unique.len(), list.len());
        assert!(list.iter().all(|m| !removed.contains(&m.id)));
    }

    let queued = cache.get_message_queue().await;
    let unique: HashSet<&str> = queued.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(unique.len(), queued.len());
    assert_eq!(queued.len(), 8 * 60 - removed.len());
    assert!(queued.iter().all(|m| !removed.contains(&m.id)));
    assert!(queued.iter().all(|m| m.body == "edited"));
}

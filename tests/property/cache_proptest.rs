//! Room list bounds and ordering under arbitrary insert sequences

use proptest::prelude::*;
use studysync::backend::cache::{CacheClient, CacheSettings};
use studysync::shared::CachedMessage;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn settings(limit: usize) -> CacheSettings {
    CacheSettings {
        room_message_limit: limit,
        ..CacheSettings::default()
    }
}

proptest! {
    #[test]
    fn test_room_list_is_bounded_and_newest_first(count in 0usize..250, limit in 1usize..120) {
        let ids: Vec<String> = runtime().block_on(async {
            let cache = CacheClient::in_process(settings(limit));
            for i in 0..count {
                cache.cache_message("r1", CachedMessage::with_id(i.to_string(), "r1", "u1", "x")).await;
            }
            cache.get_cached_messages("r1", limit).await.into_iter().map(|m| m.id).collect()
        });

        let expected: Vec<String> = (0..count).rev().take(limit).map(|i| i.to_string()).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn test_every_cached_message_is_queued_once(count in 0usize..150) {
        let queued = runtime().block_on(async {
            let cache = CacheClient::in_process(settings(100));
            for i in 0..count {
                cache.cache_message("r1", CachedMessage::with_id(i.to_string(), "r1", "u1", "x")).await;
            }
            let first = cache.get_message_queue().await;
            let second = cache.get_message_queue().await;
            (first.len(), second.len())
        });

        prop_assert_eq!(queued, (count, 0));
    }

    #[test]
    fn test_removed_ids_never_come_back(
        count in 1usize..60,
        removals in proptest::collection::vec(0usize..60, 0..20),
    ) {
        let (remaining, removed) = runtime().block_on(async {
            let cache = CacheClient::in_process(settings(100));
            for i in 0..count {
                cache.cache_message("r1", CachedMessage::with_id(i.to_string(), "r1", "u1", "x")).await;
            }
            for id in &removals {
                cache.remove_message("r1", &id.to_string()).await;
            }
            let remaining: Vec<String> = cache
                .get_cached_messages("r1", 100)
                .await
                .into_iter()
                .map(|m| m.id)
                .collect();
            (remaining, removals.iter().map(|id| id.to_string()).collect::<Vec<_>>())
        });

        for id in &removed {
            prop_assert!(!remaining.contains(id));
        }
        prop_assert!(remaining.windows(2).all(|pair| {
            pair[0].parse::<usize>().unwrap_or(0) > pair[1].parse::<usize>().unwrap_or(0)
        }), "remaining messages are not in strictly descending order");
    }
}

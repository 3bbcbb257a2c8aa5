/**
 * In-process chat store
 * 
 * The fallback backend. Room lists, presence and typing markers live in
 * process memory behind tokio locks. Room lists and presence carry no TTL
 * here (they last until removal or restart); typing markers expire through a
 * fire-and-forget timer task per start call.
 */

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::backend::cache::store::{CacheSettings, ChatStore, StoreKind};
use crate::backend::error::CacheError;
use crate::shared::{CachedMessage, PresenceEntry};

/// Room id -> (user id -> marker deadline)
type TypingMap = HashMap<String, HashMap<String, Instant>>;

/// Process-local implementation of `ChatStore`
#[derive(Debug, Default)]
pub struct InProcessStore {
    settings: CacheSettings,
    rooms: RwLock<HashMap<String, VecDeque<CachedMessage>>>,
    presence: RwLock<HashMap<String, PresenceEntry>>,
    typing: Arc<RwLock<TypingMap>>,
}

impl InProcessStore {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Remove `user_id` from `room_id` once its marker deadline has passed.
    ///
    /// A renewal pushes the deadline out, so the timer from an earlier start
    /// finds a future deadline and leaves the marker alone.
    fn schedule_typing_expiry(&self, room_id: String, user_id: String) {
        let typing = Arc::clone(&self.typing);
        let ttl = self.settings.typing_ttl;

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;

            let mut typing = typing.write().await;
            if let Some(users) = typing.get_mut(&room_id) {
                let expired = users
                    .get(&user_id)
                    .is_some_and(|deadline| *deadline <= Instant::now());
                if expired {
                    users.remove(&user_id);
                    tracing::debug!("[Cache] Typing marker expired: room={}, user={}", room_id, user_id);
                }
                if users.is_empty() {
                    typing.remove(&room_id);
                }
            }
        });
    }
}

#[async_trait]
impl ChatStore for InProcessStore {
    fn kind(&self) -> StoreKind {
        StoreKind::InProcess
    }

    async fn push_message(&self, room_id: &str, message: &CachedMessage) -> Result<(), CacheError> {
        let mut rooms = self.rooms.write().await;
        let list = rooms.entry(room_id.to_string()).or_default();
        list.push_front(message.clone());
        list.truncate(self.settings.room_message_limit);
        Ok(())
    }

    async fn get_messages(&self, room_id: &str, limit: usize) -> Result<Vec<CachedMessage>, CacheError> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .get(room_id)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_message(&self, room_id: &str, message_id: &str) -> Result<bool, CacheError> {
        let mut rooms = self.rooms.write().await;
        let Some(list) = rooms.get_mut(room_id) else {
            return Ok(false);
        };

        let before = list.len();
        list.retain(|message| message.id != message_id);
        let removed = list.len() != before;

        if list.is_empty() {
            rooms.remove(room_id);
        }
        Ok(removed)
    }

    async fn update_message(&self, room_id: &str, message_id: &str, body: &str) -> Result<bool, CacheError> {
        let mut rooms = self.rooms.write().await;
        let found = rooms
            .get_mut(room_id)
            .and_then(|list| list.iter_mut().find(|message| message.id == message_id))
            .map(|message| message.body = body.to_string())
            .is_some();
        Ok(found)
    }

    async fn add_presence(&self, entry: &PresenceEntry) -> Result<(), CacheError> {
        self.presence
            .write()
            .await
            .insert(entry.user_id.clone(), entry.clone());
        Ok(())
    }

    async fn remove_presence(&self, user_id: &str) -> Result<(), CacheError> {
        self.presence.write().await.remove(user_id);
        Ok(())
    }

    async fn online_users(&self) -> Result<HashSet<String>, CacheError> {
        Ok(self.presence.read().await.keys().cloned().collect())
    }

    async fn set_typing(&self, room_id: &str, user_id: &str, is_typing: bool) -> Result<(), CacheError> {
        let mut typing = self.typing.write().await;

        if is_typing {
            let deadline = Instant::now() + self.settings.typing_ttl;
            typing
                .entry(room_id.to_string())
                .or_default()
                .insert(user_id.to_string(), deadline);
            drop(typing);
            self.schedule_typing_expiry(room_id.to_string(), user_id.to_string());
        } else if let Some(users) = typing.get_mut(room_id) {
            users.remove(user_id);
            if users.is_empty() {
                typing.remove(room_id);
            }
        }
        Ok(())
    }

    async fn typing_users(&self, room_id: &str) -> Result<HashSet<String>, CacheError> {
        let now = Instant::now();
        let typing = self.typing.read().await;
        Ok(typing
            .get(room_id)
            .map(|users| {
                users
                    .iter()
                    .filter(|(_, deadline)| **deadline > now)
                    .map(|(user, _)| user.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn room_count(&self) -> Result<usize, CacheError> {
        Ok(self.rooms.read().await.len())
    }
}

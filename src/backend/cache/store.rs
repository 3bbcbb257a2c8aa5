/**
 * ChatStore trait
 * 
 * The chat cache talks to two unrelated backends through this one trait: the
 * networked fast path (`RedisStore`) and the in-process fallback
 * (`InProcessStore`). `CacheClient` picks one per call through the
 * `BackendSelector`; neither implementation knows about the other.
 */

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

use crate::backend::error::CacheError;
use crate::shared::{AppConfig, CachedMessage, PresenceEntry};

/// Which kind of backend a store is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Networked key-value/list/set server
    FastPath,
    /// Process-local structures
    InProcess,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::FastPath => write!(f, "fast-path"),
            StoreKind::InProcess => write!(f, "in-process"),
        }
    }
}

/// Limits and expiry windows shared by both backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum messages retained per room
    pub room_message_limit: usize,
    /// Fast-path TTL of a room list, reset on every new message
    pub message_ttl: Duration,
    /// Fast-path TTL of the presence hash
    pub presence_ttl: Duration,
    /// Lifetime of a typing marker without renewal
    pub typing_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CacheSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            room_message_limit: config.room_message_limit,
            message_ttl: config.message_ttl(),
            presence_ttl: config.presence_ttl(),
            typing_ttl: config.typing_ttl(),
        }
    }
}

/// Storage operations behind the chat cache.
///
/// Room lists are newest-first and never longer than the configured limit
/// after a mutating call returns.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Backend kind, used for logging and stats
    fn kind(&self) -> StoreKind;

    /// Insert a message at the front of the room list and bound its length.
    async fn push_message(&self, room_id: &str, message: &CachedMessage) -> Result<(), CacheError>;

    /// Up to `limit` messages, newest first.
    async fn get_messages(&self, room_id: &str, limit: usize) -> Result<Vec<CachedMessage>, CacheError>;

    /// Remove a message by id. Returns whether anything was removed.
    async fn remove_message(&self, room_id: &str, message_id: &str) -> Result<bool, CacheError>;

    /// Replace a message body in place. Returns whether the message was found.
    async fn update_message(&self, room_id: &str, message_id: &str, body: &str) -> Result<bool, CacheError>;

    /// Insert or overwrite a user's presence entry.
    async fn add_presence(&self, entry: &PresenceEntry) -> Result<(), CacheError>;

    async fn remove_presence(&self, user_id: &str) -> Result<(), CacheError>;

    async fn online_users(&self) -> Result<HashSet<String>, CacheError>;

    /// Start (`true`) or stop (`false`) a typing marker.
    async fn set_typing(&self, room_id: &str, user_id: &str, is_typing: bool) -> Result<(), CacheError>;

    async fn typing_users(&self, room_id: &str) -> Result<HashSet<String>, CacheError>;

    /// Number of rooms with a cached message list.
    async fn room_count(&self) -> Result<usize, CacheError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    /// Release any connection held by the store.
    async fn close(&self) {}
}

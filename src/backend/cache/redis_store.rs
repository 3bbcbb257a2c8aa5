/**
 * Redis-backed chat store
 * 
 * # Key Layout
 * 
 * - `chat:room:{room_id}:messages` - list of JSON messages, newest at the head,
 *   trimmed to the room limit and expiring `message_ttl` after the last push
 * - `chat:online` - hash of user id -> JSON presence entry, expiring
 *   `presence_ttl` after the last join
 * - `chat:room:{room_id}:typing` - set of user ids, expiring `typing_ttl`
 *   after the last start
 * 
 * # Connection
 * 
 * The connection is established lazily and kept in a `ConnectionManager`, so
 * a store created while Redis is down can still connect on a later call.
 */

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::cache::store::{CacheSettings, ChatStore, StoreKind};
use crate::backend::error::CacheError;
use crate::shared::{CachedMessage, PresenceEntry};

const ONLINE_KEY: &str = "chat:online";
const ROOM_SCAN_PATTERN: &str = "chat:room:*:messages";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn messages_key(room_id: &str) -> String {
    format!("chat:room:{}:messages", room_id)
}

fn typing_key(room_id: &str) -> String {
    format!("chat:room:{}:typing", room_id)
}

fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

fn entry_id(room_id: &str, json: &str) -> Option<String> {
    match CachedMessage::from_json(json) {
        Ok(message) => Some(message.id),
        Err(e) => {
            tracing::warn!("[Cache] Keeping unreadable message in room {} as is: {}", room_id, e);
            None
        }
    }
}

/// Room list without `message_id`, or `None` when it is not there.
/// Unreadable entries are kept unchanged.
fn without_message(room_id: &str, raw: Vec<String>, message_id: &str) -> Option<Vec<String>> {
    let before = raw.len();
    let kept: Vec<String> = raw
        .into_iter()
        .filter(|json| entry_id(room_id, json).as_deref() != Some(message_id))
        .collect();
    (kept.len() != before).then_some(kept)
}

/// Room list with the body of `message_id` replaced, or `None` when it is not there.
fn with_updated_body(
    room_id: &str,
    raw: Vec<String>,
    message_id: &str,
    body: &str,
) -> Result<Option<Vec<String>>, CacheError> {
    let mut found = false;
    let mut rewritten = Vec::with_capacity(raw.len());
    for json in raw {
        match CachedMessage::from_json(&json) {
            Ok(mut message) if message.id == message_id => {
                message.body = body.to_string();
                rewritten.push(message.to_json()?);
                found = true;
            }
            Ok(_) => rewritten.push(json),
            Err(e) => {
                tracing::warn!("[Cache] Keeping unreadable message in room {} as is: {}", room_id, e);
                rewritten.push(json);
            }
        }
    }
    Ok(found.then_some(rewritten))
}

pub struct RedisStore {
    client: redis::Client,
    connection: RwLock<Option<ConnectionManager>>,
    closed: AtomicBool,
    settings: CacheSettings,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("settings", &self.settings)
            .finish()
    }
}

impl RedisStore {
    /// Parse the connection URL. No network traffic happens here.
    pub fn open(url: &str, settings: CacheSettings) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            closed: AtomicBool::new(false),
            settings,
        })
    }

    /// Shared handle to the multiplexed connection, connecting on first use.
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable { backend: "redis" });
        }

        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|_| CacheError::Unavailable { backend: "redis" })??;
        tracing::info!("[Cache] Redis connection established");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Replace a room list with `entries`, keeping order and resetting its TTL.
    async fn rewrite_room(&self, room_id: &str, entries: &[String]) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let key = messages_key(room_id);

        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !entries.is_empty() {
            pipe.rpush(&key, entries)
                .ignore()
                .expire(&key, ttl_secs(self.settings.message_ttl))
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn raw_room(&self, room_id: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn.lrange(messages_key(room_id), 0, -1).await?;
        Ok(raw)
    }
}

#[async_trait]
impl ChatStore for RedisStore {
    fn kind(&self) -> StoreKind {
        StoreKind::FastPath
    }

    async fn push_message(&self, room_id: &str, message: &CachedMessage) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let key = messages_key(room_id);
        let limit = self.settings.room_message_limit.max(1) as isize;

        let _: () = redis::pipe()
            .atomic()
            .lpush(&key, message.to_json()?)
            .ignore()
            .ltrim(&key, 0, limit - 1)
            .ignore()
            .expire(&key, ttl_secs(self.settings.message_ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_messages(&self, room_id: &str, limit: usize) -> Result<Vec<CachedMessage>, CacheError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn
            .lrange(messages_key(room_id), 0, limit as isize - 1)
            .await?;

        Ok(raw
            .iter()
            .filter_map(|json| match CachedMessage::from_json(json) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("[Cache] Skipping unreadable message in room {}: {}", room_id, e);
                    None
                }
            })
            .collect())
    }

    async fn remove_message(&self, room_id: &str, message_id: &str) -> Result<bool, CacheError> {
        let raw = self.raw_room(room_id).await?;

        match without_message(room_id, raw, message_id) {
            Some(kept) => {
                self.rewrite_room(room_id, &kept).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_message(&self, room_id: &str, message_id: &str, body: &str) -> Result<bool, CacheError> {
        let raw = self.raw_room(room_id).await?;

        match with_updated_body(room_id, raw, message_id, body)? {
            Some(rewritten) => {
                self.rewrite_room(room_id, &rewritten).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_presence(&self, entry: &PresenceEntry) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(entry)?;

        let _: () = redis::pipe()
            .atomic()
            .hset(ONLINE_KEY, &entry.user_id, json)
            .ignore()
            .expire(ONLINE_KEY, ttl_secs(self.settings.presence_ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove_presence(&self, user_id: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.hdel(ONLINE_KEY, user_id).await?;
        Ok(())
    }

    async fn online_users(&self) -> Result<HashSet<String>, CacheError> {
        let mut conn = self.connection().await?;
        let users: Vec<String> = conn.hkeys(ONLINE_KEY).await?;
        Ok(users.into_iter().collect())
    }

    async fn set_typing(&self, room_id: &str, user_id: &str, is_typing: bool) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let key = typing_key(room_id);

        if is_typing {
            let _: () = redis::pipe()
                .atomic()
                .sadd(&key, user_id)
                .ignore()
                .expire(&key, ttl_secs(self.settings.typing_ttl))
                .ignore()
                .query_async(&mut conn)
                .await?;
        } else {
            let _: () = conn.srem(&key, user_id).await?;
        }
        Ok(())
    }

    async fn typing_users(&self, room_id: &str) -> Result<HashSet<String>, CacheError> {
        let mut conn = self.connection().await?;
        let users: HashSet<String> = conn.smembers(typing_key(room_id)).await?;
        Ok(users)
    }

    async fn room_count(&self) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;

        // SCAN may return a key more than once
        let mut keys = HashSet::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(ROOM_SCAN_PATTERN)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys.len())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.connection.write().await.take().is_some() {
            tracing::info!("[Cache] Redis connection closed");
        }
    }
}

/**
 * Cache Client
 * 
 * The public chat cache API used by route and socket handlers.
 * 
 * # Routing
 * 
 * Each call goes to the fast-path store while the `BackendSelector` says it
 * is usable; any failure there is logged and the same call is served from
 * the in-process store instead. Callers never see a cache error.
 * 
 * Connection-level failures also flip the selector to the fallback. A probe
 * task pings the fast path while it is off and flips it back on success.
 * 
 * # Write-behind
 * 
 * Every message passed to `cache_message` is appended to the write-behind
 * queue regardless of which store accepted it. Mutations of one room are
 * serialized within the process through a fixed set of sharded locks.
 */

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::cache::memory::InProcessStore;
use crate::backend::cache::queue::WriteBehindQueue;
use crate::backend::cache::redis_store::RedisStore;
use crate::backend::cache::selector::BackendSelector;
use crate::backend::cache::store::{CacheSettings, ChatStore};
use crate::backend::error::CacheError;
use crate::shared::{AppConfig, CachedMessage, PresenceEntry};

/// Messages returned by `get_cached_messages` when the caller has no preference
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Room mutations are serialized through a fixed set of locks picked by room id.
const ROOM_LOCK_SHARDS: usize = 64;

/// Snapshot returned by `CacheClient::get_stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub using_fast_path: bool,
    pub connected: bool,
    pub cached_room_count: usize,
    pub online_user_count: usize,
    pub queued_message_count: usize,
}

/// Try the fast path when it is selected, otherwise (or on failure) run the
/// same call against the in-process store.
macro_rules! route {
    ($client:expr, $op:literal, $store:ident => $call:expr) => {{
        let mut served = None;
        if let Some($store) = $client.active_fast_path() {
            match $call.await {
                Ok(value) => served = Some(value),
                Err(e) => $client.note_fast_path_failure($op, &e),
            }
        }
        match served {
            Some(value) => value,
            None => {
                let $store: &dyn ChatStore = &$client.fallback;
                match $call.await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::error!("[Cache] {} failed on in-process store: {}", $op, e);
                        Default::default()
                    }
                }
            }
        }
    }};
}

pub struct CacheClient {
    selector: Arc<BackendSelector>,
    fast_path: Option<Arc<dyn ChatStore>>,
    fallback: InProcessStore,
    queue: WriteBehindQueue,
    room_locks: Vec<Mutex<()>>,
    probe: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("selector", &self.selector)
            .field("fast_path", &self.fast_path.as_ref().map(|store| store.kind()))
            .finish()
    }
}

impl CacheClient {
    /// Build the client from configuration.
    ///
    /// Without `redis_url` (or with one that does not parse) the client runs
    /// on the in-process store only and reports itself connected.
    pub async fn init(config: &AppConfig) -> Self {
        let settings = CacheSettings::from(config);

        let Some(url) = config.redis_url.as_deref() else {
            tracing::warn!("[Cache] REDIS_URL not configured, using in-process cache");
            return Self::in_process(settings);
        };

        match RedisStore::open(url, settings.clone()) {
            Ok(store) => Self::with_fast_path(Arc::new(store), settings, config.probe_interval()).await,
            Err(e) => {
                tracing::warn!("[Cache] Invalid REDIS_URL ({}), using in-process cache", e);
                Self::in_process(settings)
            }
        }
    }

    /// Client with no fast path at all
    pub fn in_process(settings: CacheSettings) -> Self {
        Self {
            selector: Arc::new(BackendSelector::new(false)),
            fast_path: None,
            fallback: InProcessStore::new(settings),
            queue: WriteBehindQueue::new(),
            room_locks: room_locks(),
            probe: std::sync::Mutex::new(None),
        }
    }

    /// Client with a fast-path store.
    ///
    /// Pings the store once; on failure the client starts on the fallback and
    /// the probe task keeps trying every `probe_interval`.
    pub async fn with_fast_path(
        store: Arc<dyn ChatStore>,
        settings: CacheSettings,
        probe_interval: Duration,
    ) -> Self {
        let selector = Arc::new(BackendSelector::new(true));

        match store.ping().await {
            Ok(()) => {
                selector.mark_connected();
                tracing::info!("[Cache] Connected to {} store", store.kind());
            }
            Err(e) => {
                tracing::warn!("[Cache] {} store unreachable, starting on fallback: {}", store.kind(), e);
            }
        }

        let probe = spawn_probe(Arc::clone(&store), Arc::clone(&selector), probe_interval);

        Self {
            selector,
            fast_path: Some(store),
            fallback: InProcessStore::new(settings),
            queue: WriteBehindQueue::new(),
            room_locks: room_locks(),
            probe: std::sync::Mutex::new(Some(probe)),
        }
    }

    fn active_fast_path(&self) -> Option<&Arc<dyn ChatStore>> {
        self.fast_path
            .as_ref()
            .filter(|_| self.selector.use_fast_path())
    }

    fn note_fast_path_failure(&self, operation: &str, err: &CacheError) {
        tracing::warn!("[Cache] {} failed on fast path, using fallback: {}", operation, err);
        if err.is_connection_error() {
            self.selector.mark_unavailable();
        }
    }

    /// Serializes mutations of one room within this process.
    async fn lock_room(&self, room_id: &str) -> MutexGuard<'_, ()> {
        self.room_locks[room_shard(room_id)].lock().await
    }

    /// Whether the cache is ready to serve calls.
    pub fn is_connected(&self) -> bool {
        self.selector.is_connected()
    }

    pub fn is_using_fast_path(&self) -> bool {
        self.fast_path.is_some() && self.selector.use_fast_path()
    }

    /// Put a message at the front of its room list and queue it for persistence.
    pub async fn cache_message(&self, room_id: &str, message: CachedMessage) {
        {
            let _room = self.lock_room(room_id).await;
            route!(self, "cache_message", store => store.push_message(room_id, &message));
        }
        self.queue.push(message).await;
    }

    /// Up to `limit` messages of a room, newest first.
    pub async fn get_cached_messages(&self, room_id: &str, limit: usize) -> Vec<CachedMessage> {
        route!(self, "get_cached_messages", store => store.get_messages(room_id, limit))
    }

    /// Remove a message from the room list on both stores and from the queue.
    pub async fn remove_message(&self, room_id: &str, message_id: &str) {
        let _room = self.lock_room(room_id).await;

        if let Some(store) = self.active_fast_path() {
            if let Err(e) = store.remove_message(room_id, message_id).await {
                self.note_fast_path_failure("remove_message", &e);
            }
        }
        if let Err(e) = self.fallback.remove_message(room_id, message_id).await {
            tracing::error!("[Cache] remove_message failed on in-process store: {}", e);
        }

        if self.queue.remove(message_id).await {
            tracing::debug!("[Cache] Dropped queued message {} before persistence", message_id);
        }
    }

    /// Replace a message body in place on both stores and in the queue.
    pub async fn update_message(&self, room_id: &str, message_id: &str, body: &str) {
        let _room = self.lock_room(room_id).await;

        if let Some(store) = self.active_fast_path() {
            if let Err(e) = store.update_message(room_id, message_id, body).await {
                self.note_fast_path_failure("update_message", &e);
            }
        }
        if let Err(e) = self.fallback.update_message(room_id, message_id, body).await {
            tracing::error!("[Cache] update_message failed on in-process store: {}", e);
        }

        self.queue.update(message_id, body).await;
    }

    pub async fn add_online_user(&self, user_id: &str, socket_id: &str) {
        let entry = PresenceEntry::new(user_id, socket_id);
        route!(self, "add_online_user", store => store.add_presence(&entry))
    }

    pub async fn remove_online_user(&self, user_id: &str) {
        route!(self, "remove_online_user", store => store.remove_presence(user_id))
    }

    pub async fn get_online_users(&self) -> HashSet<String> {
        route!(self, "get_online_users", store => store.online_users())
    }

    /// Start or stop a typing marker. Markers expire after the typing TTL
    /// unless renewed.
    pub async fn set_typing(&self, room_id: &str, user_id: &str, is_typing: bool) {
        route!(self, "set_typing", store => store.set_typing(room_id, user_id, is_typing))
    }

    pub async fn get_typing_users(&self, room_id: &str) -> HashSet<String> {
        route!(self, "get_typing_users", store => store.typing_users(room_id))
    }

    /// Drain the write-behind queue: returns its contents and leaves it empty.
    pub async fn get_message_queue(&self) -> Vec<CachedMessage> {
        self.queue.take_all().await
    }

    /// Take the queue for persistence. The batch must be passed back to
    /// `settle_messages` or `requeue_messages`.
    pub async fn take_message_batch(&self) -> Vec<CachedMessage> {
        self.queue.take_batch().await
    }

    /// Mark messages from `take_message_batch` as done with.
    pub async fn settle_messages(&self, messages: &[CachedMessage]) {
        self.queue.settle(messages).await;
    }

    /// Return a batch that could not be persisted to the front of the queue.
    pub async fn requeue_messages(&self, batch: Vec<CachedMessage>) {
        self.queue.requeue_front(batch).await;
    }

    pub async fn clear_message_queue(&self) {
        self.queue.clear().await;
    }

    pub async fn get_stats(&self) -> CacheStats {
        let cached_room_count = route!(self, "get_stats", store => store.room_count());
        let online_user_count = self.get_online_users().await.len();

        CacheStats {
            using_fast_path: self.is_using_fast_path(),
            connected: self.selector.is_connected(),
            cached_room_count,
            online_user_count,
            queued_message_count: self.queue.len().await,
        }
    }

    /// Stop the probe and release the fast-path connection.
    pub async fn close(&self) {
        let probe = match self.probe.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(probe) = probe {
            probe.abort();
        }

        if let Some(store) = &self.fast_path {
            self.selector.mark_unavailable();
            store.close().await;
            tracing::info!("[Cache] Closed {} store", store.kind());
        }
    }
}

impl Drop for CacheClient {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.probe.lock() {
            if let Some(probe) = slot.take() {
                probe.abort();
            }
        }
    }
}

fn room_locks() -> Vec<Mutex<()>> {
    (0..ROOM_LOCK_SHARDS).map(|_| Mutex::new(())).collect()
}

fn room_shard(room_id: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    room_id.hash(&mut hasher);
    (hasher.finish() % ROOM_LOCK_SHARDS as u64) as usize
}

/// Ping the fast path while the selector has it switched off.
fn spawn_probe(
    store: Arc<dyn ChatStore>,
    selector: Arc<BackendSelector>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if selector.use_fast_path() {
                continue;
            }
            match store.ping().await {
                Ok(()) => {
                    selector.mark_connected();
                    tracing::info!("[Cache] Reconnected to {} store", store.kind());
                }
                Err(e) => tracing::debug!("[Cache] {} store still unreachable: {}", store.kind(), e),
            }
        }
    })
}

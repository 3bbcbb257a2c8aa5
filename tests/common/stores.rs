//! Test doubles for the cache and replication seams

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use studysync::backend::cache::{CacheSettings, ChatStore, InProcessStore, MessageSink, StoreKind};
use studysync::backend::error::{CacheError, ReplicationError};
use studysync::backend::replication::{BackupMetadata, MemoryMirror, MirrorRecord, MirrorStore};
use studysync::shared::{CachedMessage, PresenceEntry, SharedError};

const HEALTHY: u8 = 0;
const DOWN: u8 = 1;
const BROKEN: u8 = 2;

/// Fast-path stand-in: an in-process store that can be switched off.
///
/// - healthy: delegates every call
/// - down: every call fails with a connection-level error
/// - broken: every call fails with a non-connection error, pings still succeed
pub struct SwitchableStore {
    inner: InProcessStore,
    mode: AtomicU8,
    calls: AtomicUsize,
}

impl SwitchableStore {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            inner: InProcessStore::new(CacheSettings::default()),
            mode: AtomicU8::new(HEALTHY),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn down() -> Arc<Self> {
        let store = Self::healthy();
        store.go_down();
        store
    }

    pub fn go_down(&self) {
        self.mode.store(DOWN, Ordering::SeqCst);
    }

    pub fn go_up(&self) {
        self.mode.store(HEALTHY, Ordering::SeqCst);
    }

    pub fn break_responses(&self) {
        self.mode.store(BROKEN, Ordering::SeqCst);
    }

    /// Calls that reached the store while it was healthy
    pub fn served_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InProcessStore {
        &self.inner
    }

    fn check(&self) -> Result<(), CacheError> {
        match self.mode.load(Ordering::SeqCst) {
            DOWN => Err(CacheError::Unavailable { backend: "test" }),
            BROKEN => Err(CacheError::Shared(SharedError::serialization("garbled reply"))),
            _ => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ChatStore for SwitchableStore {
    fn kind(&self) -> StoreKind {
        StoreKind::FastPath
    }

    async fn push_message(&self, room_id: &str, message: &CachedMessage) -> Result<(), CacheError> {
        self.check()?;
        self.inner.push_message(room_id, message).await
    }

    async fn get_messages(&self, room_id: &str, limit: usize) -> Result<Vec<CachedMessage>, CacheError> {
        self.check()?;
        self.inner.get_messages(room_id, limit).await
    }

    async fn remove_message(&self, room_id: &str, message_id: &str) -> Result<bool, CacheError> {
        self.check()?;
        self.inner.remove_message(room_id, message_id).await
    }

    async fn update_message(&self, room_id: &str, message_id: &str, body: &str) -> Result<bool, CacheError> {
        self.check()?;
        self.inner.update_message(room_id, message_id, body).await
    }

    async fn add_presence(&self, entry: &PresenceEntry) -> Result<(), CacheError> {
        self.check()?;
        self.inner.add_presence(entry).await
    }

    async fn remove_presence(&self, user_id: &str) -> Result<(), CacheError> {
        self.check()?;
        self.inner.remove_presence(user_id).await
    }

    async fn online_users(&self) -> Result<HashSet<String>, CacheError> {
        self.check()?;
        self.inner.online_users().await
    }

    async fn set_typing(&self, room_id: &str, user_id: &str, is_typing: bool) -> Result<(), CacheError> {
        self.check()?;
        self.inner.set_typing(room_id, user_id, is_typing).await
    }

    async fn typing_users(&self, room_id: &str) -> Result<HashSet<String>, CacheError> {
        self.check()?;
        self.inner.typing_users(room_id).await
    }

    async fn room_count(&self) -> Result<usize, CacheError> {
        self.check()?;
        self.inner.room_count().await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        match self.mode.load(Ordering::SeqCst) {
            DOWN => Err(CacheError::Unavailable { backend: "test" }),
            _ => Ok(()),
        }
    }
}

/// Sink that records persisted ids and can be told to fail
#[derive(Default)]
pub struct RecordingSink {
    pub persisted: Mutex<Vec<String>>,
    pub failing: AtomicBool,
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn persist(&self, messages: &[CachedMessage]) -> Result<usize, ReplicationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReplicationError::NotConfigured);
        }
        self.persisted
            .lock()
            .await
            .extend(messages.iter().map(|m| m.id.clone()));
        Ok(messages.len())
    }
}

/// Mirror that rejects writes to one collection and delegates the rest
pub struct RejectingMirror {
    pub inner: Arc<MemoryMirror>,
    pub rejected_collection: String,
}

impl RejectingMirror {
    fn check(&self, collection: &str) -> Result<(), ReplicationError> {
        if collection == self.rejected_collection {
            Err(ReplicationError::invalid_record(collection, "rejected by test mirror"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MirrorStore for RejectingMirror {
    async fn upsert(&self, collection: &str, record: &MirrorRecord) -> Result<(), ReplicationError> {
        self.check(collection)?;
        self.inner.upsert(collection, record).await
    }

    async fn upsert_many(&self, collection: &str, records: &[MirrorRecord]) -> Result<usize, ReplicationError> {
        self.check(collection)?;
        self.inner.upsert_many(collection, records).await
    }

    async fn delete(&self, collection: &str, original_id: &str) -> Result<bool, ReplicationError> {
        self.check(collection)?;
        self.inner.delete(collection, original_id).await
    }

    async fn insert_metadata(&self, metadata: &BackupMetadata) -> Result<(), ReplicationError> {
        self.inner.insert_metadata(metadata).await
    }

    async fn collection_names(&self) -> Result<Vec<String>, ReplicationError> {
        self.inner.collection_names().await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, ReplicationError> {
        self.inner.find_all(collection).await
    }
}

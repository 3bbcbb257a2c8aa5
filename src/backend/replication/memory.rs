/**
 * In-memory mirror
 * 
 * A `MirrorStore` kept in process memory. Used by tests and by offline
 * tooling that wants an export without a running MongoDB.
 */

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::backend::error::ReplicationError;
use crate::backend::replication::mirror::{BackupMetadata, MirrorRecord, MirrorStore, METADATA_COLLECTION};

/// Collection name -> documents keyed by `_originalId`
type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
pub struct MemoryMirror {
    collections: RwLock<Collections>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// The document mirrored for `original_id`, if any.
    pub async fn get(&self, collection: &str, original_id: &str) -> Option<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(original_id))
            .cloned()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Metadata documents written by full backups, oldest first.
    pub async fn backup_history(&self) -> Vec<BackupMetadata> {
        let collections = self.collections.read().await;
        let mut history: Vec<BackupMetadata> = collections
            .get(METADATA_COLLECTION)
            .map(|docs| {
                docs.values()
                    .filter_map(|doc| serde_json::from_value(doc.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        history.sort_by_key(|metadata| metadata.timestamp);
        history
    }
}

#[async_trait]
impl MirrorStore for MemoryMirror {
    async fn upsert(&self, collection: &str, record: &MirrorRecord) -> Result<(), ReplicationError> {
        let document = serde_json::to_value(record)?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(record.original_id.clone(), document);
        Ok(())
    }

    async fn upsert_many(&self, collection: &str, records: &[MirrorRecord]) -> Result<usize, ReplicationError> {
        let documents = records
            .iter()
            .map(|record| Ok((record.original_id.clone(), serde_json::to_value(record)?)))
            .collect::<Result<Vec<_>, ReplicationError>>()?;

        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        Ok(records.len())
    }

    async fn delete(&self, collection: &str, original_id: &str) -> Result<bool, ReplicationError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(original_id))
            .is_some())
    }

    async fn insert_metadata(&self, metadata: &BackupMetadata) -> Result<(), ReplicationError> {
        let document = serde_json::to_value(metadata)?;
        self.collections
            .write()
            .await
            .entry(METADATA_COLLECTION.to_string())
            .or_default()
            .insert(uuid::Uuid::new_v4().to_string(), document);
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>, ReplicationError> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, ReplicationError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }
}

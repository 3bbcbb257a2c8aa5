/**
 * Replication Sync
 * 
 * One-way mirroring of the primary store into the backup mirror.
 * 
 * # Outcomes
 * 
 * Every public operation reports its outcome as a plain value and logs
 * failures; none of them returns an error, so a caller inside a
 * primary-store transaction can sync without risking that transaction.
 * 
 * Without a mirror every operation is a logged no-op.
 */

use chrono::Utc;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::error::ReplicationError;
use crate::backend::replication::mirror::{is_internal_collection, BackupMetadata, MirrorRecord, MirrorStore};
use crate::backend::replication::mongo::MongoMirror;
use crate::backend::replication::source::PrimarySource;
use crate::shared::AppConfig;

pub struct ReplicationSync {
    mirror: RwLock<Option<Arc<dyn MirrorStore>>>,
    source: Option<Arc<dyn PrimarySource>>,
    collections: Vec<String>,
}

impl std::fmt::Debug for ReplicationSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationSync")
            .field("has_source", &self.source.is_some())
            .field("collections", &self.collections)
            .finish()
    }
}

impl ReplicationSync {
    /// Connect to the mirror named by `mongo_url`.
    ///
    /// A missing URL or a failed connect leaves replication disabled.
    pub async fn init(config: &AppConfig, source: Option<Arc<dyn PrimarySource>>) -> Self {
        let mirror: Option<Arc<dyn MirrorStore>> = match config.mongo_url.as_deref() {
            None => {
                tracing::warn!("[Replication] MONGODB_URI not configured, backups disabled");
                None
            }
            Some(url) => match MongoMirror::connect(url).await {
                Ok(mirror) => Some(Arc::new(mirror)),
                Err(e) => {
                    tracing::error!("[Replication] Failed to connect to MongoDB, backups disabled: {}", e);
                    None
                }
            },
        };

        Self::with_mirror(mirror, source, config.collections.clone())
    }

    pub fn with_mirror(
        mirror: Option<Arc<dyn MirrorStore>>,
        source: Option<Arc<dyn PrimarySource>>,
        collections: Vec<String>,
    ) -> Self {
        Self {
            mirror: RwLock::new(mirror),
            source,
            collections,
        }
    }

    async fn mirror(&self) -> Option<Arc<dyn MirrorStore>> {
        self.mirror.read().await.clone()
    }

    /// Whether a mirror connection is live.
    pub async fn is_configured(&self) -> bool {
        self.mirror.read().await.is_some()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Upsert one primary record. Returns whether it was mirrored.
    pub async fn sync_record(&self, collection: &str, record: &Value) -> bool {
        let Some(mirror) = self.mirror().await else {
            return false;
        };

        let result = match MirrorRecord::from_primary(collection, record, Utc::now()) {
            Ok(record) => mirror.upsert(collection, &record).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[Replication] Failed to sync record into '{}': {}", collection, e);
                false
            }
        }
    }

    /// Upsert a batch of primary records in one mirror round trip.
    ///
    /// Records without a usable id are logged and skipped. Returns how many
    /// records were mirrored; 0 covers empty input, no mirror and failure.
    pub async fn sync_bulk(&self, collection: &str, records: &[Value]) -> usize {
        if records.is_empty() {
            return 0;
        }
        let Some(mirror) = self.mirror().await else {
            return 0;
        };

        match bulk_upsert(mirror.as_ref(), collection, records).await {
            Ok(synced) => synced,
            Err(e) => {
                tracing::error!("[Replication] Bulk sync into '{}' failed: {}", collection, e);
                0
            }
        }
    }

    /// Delete the mirror record for a primary id. Returns whether one was deleted.
    pub async fn delete_record(&self, collection: &str, id: &str) -> bool {
        let Some(mirror) = self.mirror().await else {
            return false;
        };

        match mirror.delete(collection, id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!("[Replication] Failed to delete '{}' from '{}': {}", id, collection, e);
                false
            }
        }
    }

    /// Mirror every configured collection and record a metadata document.
    ///
    /// A collection that fails is logged and listed as failed; the rest still
    /// run. Returns `true` only when every collection succeeded and the
    /// metadata was written. Without a mirror or a primary source nothing is
    /// written and the result is `false`.
    pub async fn full_backup(&self) -> bool {
        let Some(mirror) = self.mirror().await else {
            tracing::warn!("[Backup] Skipping full backup: mirror not configured");
            return false;
        };
        let Some(source) = self.source.as_ref() else {
            tracing::warn!("[Backup] Skipping full backup: primary store not configured");
            return false;
        };

        tracing::info!("[Backup] Starting full backup of {} collections", self.collections.len());

        let mut processed = Vec::with_capacity(self.collections.len());
        let mut failed = Vec::new();
        let mut total = 0;

        for collection in &self.collections {
            let result = match source.fetch_all(collection).await {
                Ok(records) => bulk_upsert(mirror.as_ref(), collection, &records).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(synced) => {
                    total += synced;
                    processed.push(collection.clone());
                }
                Err(e) => {
                    tracing::error!("[Backup] Collection '{}' failed: {}", collection, e);
                    failed.push(collection.clone());
                }
            }
        }

        let metadata = BackupMetadata::new(processed, failed);
        if let Err(e) = mirror.insert_metadata(&metadata).await {
            tracing::error!("[Backup] Failed to record backup metadata: {}", e);
            return false;
        }

        tracing::info!(
            "[Backup] Full backup {}: {} records across {} collections, {} failed",
            metadata.status.as_str(),
            total,
            metadata.collections.len(),
            metadata.failed.len()
        );
        metadata.failed.is_empty()
    }

    /// Always `false`: restoring into the primary store needs a manual,
    /// foreign-key-ordered procedure.
    pub async fn restore(&self) -> bool {
        tracing::warn!(
            "[Backup] Restore from mirror is not supported; it requires a manual, \
             order-aware import that respects foreign keys"
        );
        false
    }

    /// Write every non-internal mirror collection into one JSON file at `path`.
    ///
    /// The file is an object keyed by collection name, each value the array of
    /// that collection's documents.
    pub async fn export_to_json(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let Some(mirror) = self.mirror().await else {
            tracing::warn!("[Backup] Skipping export: mirror not configured");
            return false;
        };

        match export(mirror.as_ref(), path).await {
            Ok(count) => {
                tracing::info!("[Backup] Exported {} collections to {}", count, path.display());
                true
            }
            Err(e) => {
                tracing::error!("[Backup] Export to {} failed: {}", path.display(), e);
                false
            }
        }
    }

    /// Release the mirror connection. Later calls behave as unconfigured.
    pub async fn close(&self) {
        let mirror = self.mirror.write().await.take();
        if let Some(mirror) = mirror {
            mirror.close().await;
        }
    }
}

async fn bulk_upsert(
    mirror: &dyn MirrorStore,
    collection: &str,
    records: &[Value],
) -> Result<usize, ReplicationError> {
    let synced_at = Utc::now();
    let prepared: Vec<MirrorRecord> = records
        .iter()
        .filter_map(|record| match MirrorRecord::from_primary(collection, record, synced_at) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::error!("[Replication] Skipping record: {}", e);
                None
            }
        })
        .collect();

    if prepared.is_empty() {
        return Ok(0);
    }

    let synced = mirror.upsert_many(collection, &prepared).await?;
    tracing::info!("[Replication] Synced {} records into '{}'", synced, collection);
    Ok(synced)
}

async fn export(mirror: &dyn MirrorStore, path: &Path) -> Result<usize, ReplicationError> {
    let mut names: Vec<String> = mirror
        .collection_names()
        .await?
        .into_iter()
        .filter(|name| !is_internal_collection(name))
        .collect();
    names.sort();

    let mut dump = Map::new();
    for name in names {
        let documents = mirror.find_all(&name).await?;
        dump.insert(name, Value::Array(documents));
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let count = dump.len();
    let json = serde_json::to_vec_pretty(&Value::Object(dump))?;
    tokio::fs::write(path, json).await?;
    Ok(count)
}

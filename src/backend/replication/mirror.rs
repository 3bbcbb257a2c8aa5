/**
 * Mirror records and the MirrorStore trait
 * 
 * A mirror record is a primary-store row copied into the backup mirror with
 * three provenance fields added:
 * 
 * - `_originalId` - the primary record's `id`, always as a string; the upsert key
 * - `_syncedAt` - when the record was last mirrored
 * - `_source` - which primary store it came from
 * 
 * Every other field is copied as-is except `id` and `_id`. A primary field
 * named like a provenance field is dropped.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::error::ReplicationError;

/// Collection holding one document per completed full backup
pub const METADATA_COLLECTION: &str = "_backup_metadata";

/// `_source` tag written on every mirror record
pub const SOURCE_TAG: &str = "postgresql";

/// Primary fields never copied; the provenance fields are always rewritten
const SKIPPED_FIELDS: [&str; 5] = ["id", "_id", "_originalId", "_syncedAt", "_source"];

/// Whether a mirror collection is internal and left out of exports.
pub fn is_internal_collection(name: &str) -> bool {
    name.starts_with('_') || name.starts_with("system.")
}

/// A primary record prepared for the mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    #[serde(rename = "_originalId")]
    pub original_id: String,
    #[serde(rename = "_syncedAt")]
    pub synced_at: DateTime<Utc>,
    #[serde(rename = "_source")]
    pub source: String,
    /// Copied primary fields, without `id`
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MirrorRecord {
    /// Build a mirror record from a primary record.
    ///
    /// The record must be a JSON object with a string or numeric `id`.
    pub fn from_primary(
        collection: &str,
        record: &Value,
        synced_at: DateTime<Utc>,
    ) -> Result<Self, ReplicationError> {
        let Value::Object(object) = record else {
            return Err(ReplicationError::invalid_record(collection, "record is not an object"));
        };

        let original_id = match object.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            Some(_) => {
                return Err(ReplicationError::invalid_record(
                    collection,
                    "id must be a non-empty string or a number",
                ))
            }
            None => return Err(ReplicationError::invalid_record(collection, "missing id")),
        };

        let fields = object
            .iter()
            .filter(|(key, _)| !SKIPPED_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            original_id,
            synced_at,
            source: SOURCE_TAG.to_string(),
            fields,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    /// Every collection was mirrored
    Completed,
    /// At least one collection failed to read or write
    Partial,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Completed => "completed",
            BackupStatus::Partial => "partial",
        }
    }
}

/// Written to `METADATA_COLLECTION` at the end of a full backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub status: BackupStatus,
    /// Collections mirrored without error
    pub collections: Vec<String>,
    /// Collections that could not be read or written
    pub failed: Vec<String>,
}

impl BackupMetadata {
    pub fn new(collections: Vec<String>, failed: Vec<String>) -> Self {
        let status = if failed.is_empty() {
            BackupStatus::Completed
        } else {
            BackupStatus::Partial
        };
        Self {
            timestamp: Utc::now(),
            source: SOURCE_TAG.to_string(),
            status,
            collections,
            failed,
        }
    }
}

/// Document store receiving mirrored records
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Insert or replace the record with the same `_originalId`.
    async fn upsert(&self, collection: &str, record: &MirrorRecord) -> Result<(), ReplicationError>;

    /// Upsert a batch in one round trip. Returns how many records were written.
    async fn upsert_many(&self, collection: &str, records: &[MirrorRecord]) -> Result<usize, ReplicationError>;

    /// Delete by `_originalId`. Returns whether a record was deleted.
    async fn delete(&self, collection: &str, original_id: &str) -> Result<bool, ReplicationError>;

    async fn insert_metadata(&self, metadata: &BackupMetadata) -> Result<(), ReplicationError>;

    /// Names of every collection in the mirror, internal ones included.
    async fn collection_names(&self) -> Result<Vec<String>, ReplicationError>;

    /// Every document of a collection as JSON.
    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, ReplicationError>;

    async fn close(&self) {}
}

/**
 * MongoDB mirror
 * 
 * Each primary collection maps to a MongoDB collection of the same name.
 * Records are upserted with `$set` filtered on `_originalId`, so repeated
 * syncs converge on one document per primary record.
 */

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::UpdateOptions;
use mongodb::{Client, Collection, Database};
use serde_json::Value;

use crate::backend::error::ReplicationError;
use crate::backend::replication::mirror::{BackupMetadata, MirrorRecord, MirrorStore, METADATA_COLLECTION};

/// Database used when the connection string names none
const DEFAULT_DATABASE: &str = "studysync_backup";

/// Upserts per `update` command. `run_command` does not split batches, and
/// the server rejects commands over 16 MB or `maxWriteBatchSize` statements.
const UPSERT_BATCH_SIZE: usize = 1_000;

#[derive(Debug, Clone)]
pub struct MongoMirror {
    client: Client,
    database: Database,
}

impl MongoMirror {
    /// Connect and verify the server answers a ping.
    pub async fn connect(url: &str) -> Result<Self, ReplicationError> {
        let client = Client::with_uri_str(url).await?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));

        database.run_command(doc! { "ping": 1 }, None).await?;
        tracing::info!("[Replication] Connected to MongoDB database '{}'", database.name());

        Ok(Self { client, database })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

fn to_bson_datetime(timestamp: chrono::DateTime<chrono::Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(timestamp.timestamp_millis())
}

/// `$set` body for a mirror record
fn record_document(record: &MirrorRecord) -> Result<Document, ReplicationError> {
    let mut document = bson::to_document(&record.fields)?;
    document.insert("_originalId", record.original_id.clone());
    document.insert("_syncedAt", to_bson_datetime(record.synced_at));
    document.insert("_source", record.source.clone());
    Ok(document)
}

/// One unordered `update` command per `UPSERT_BATCH_SIZE` statements
fn update_commands(collection: &str, updates: &[Document]) -> Vec<Document> {
    updates
        .chunks(UPSERT_BATCH_SIZE)
        .map(|chunk| {
            doc! {
                "update": collection,
                "updates": chunk.to_vec(),
                "ordered": false,
            }
        })
        .collect()
}

#[async_trait]
impl MirrorStore for MongoMirror {
    async fn upsert(&self, collection: &str, record: &MirrorRecord) -> Result<(), ReplicationError> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.collection(collection)
            .update_one(
                doc! { "_originalId": record.original_id.as_str() },
                doc! { "$set": record_document(record)? },
                options,
            )
            .await?;
        Ok(())
    }

    async fn upsert_many(&self, collection: &str, records: &[MirrorRecord]) -> Result<usize, ReplicationError> {
        if records.is_empty() {
            return Ok(0);
        }

        let updates = records
            .iter()
            .map(|record| {
                Ok(doc! {
                    "q": { "_originalId": record.original_id.as_str() },
                    "u": { "$set": record_document(record)? },
                    "upsert": true,
                })
            })
            .collect::<Result<Vec<Document>, ReplicationError>>()?;

        let mut write_errors = 0;
        for command in update_commands(collection, &updates) {
            let response = self.database.run_command(command, None).await?;
            write_errors += response.get_array("writeErrors").map(Vec::len).unwrap_or(0);
        }

        if write_errors > 0 {
            tracing::warn!(
                "[Replication] {} of {} upserts into '{}' were rejected",
                write_errors,
                records.len(),
                collection
            );
        }
        Ok(records.len().saturating_sub(write_errors))
    }

    async fn delete(&self, collection: &str, original_id: &str) -> Result<bool, ReplicationError> {
        let result = self
            .collection(collection)
            .delete_one(doc! { "_originalId": original_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn insert_metadata(&self, metadata: &BackupMetadata) -> Result<(), ReplicationError> {
        let document = doc! {
            "timestamp": to_bson_datetime(metadata.timestamp),
            "source": metadata.source.as_str(),
            "status": metadata.status.as_str(),
            "collections": metadata.collections.clone(),
            "failed": metadata.failed.clone(),
        };
        self.collection(METADATA_COLLECTION)
            .insert_one(document, None)
            .await?;
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>, ReplicationError> {
        Ok(self.database.list_collection_names(None).await?)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, ReplicationError> {
        let cursor = self.collection(collection).find(None, None).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents
            .into_iter()
            .map(|document| Bson::Document(document).into_relaxed_extjson())
            .collect())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        tracing::info!("[Replication] MongoDB connection closed");
    }
}

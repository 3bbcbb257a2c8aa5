/**
 * Primary store access for full backups
 * 
 * `ReplicationSync::full_backup` reads every configured collection through a
 * `PrimarySource`. Records come back as JSON objects so the mirror code does
 * not depend on any table schema.
 */

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::backend::error::ReplicationError;

#[async_trait]
pub trait PrimarySource: Send + Sync {
    /// Every record of `collection`.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, ReplicationError>;
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Reads whole tables from PostgreSQL as JSON rows
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrimarySource for PgSource {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, ReplicationError> {
        if !is_valid_identifier(collection) {
            return Err(ReplicationError::InvalidCollection(collection.to_string()));
        }

        let sql = format!(r#"SELECT row_to_json(t)::text FROM "{}" t"#, collection);
        let rows: Vec<String> = sqlx::query_scalar::<_, String>(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| serde_json::from_str(row).map_err(ReplicationError::from))
            .collect()
    }
}

/// Fixed records per collection
#[derive(Debug, Default)]
pub struct MemorySource {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records of a collection.
    pub async fn insert(&self, collection: &str, records: Vec<Value>) {
        self.collections
            .write()
            .await
            .insert(collection.to_string(), records);
    }
}

#[async_trait]
impl PrimarySource for MemorySource {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, ReplicationError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

//! StudySync - Chat Cache and Backup Replication
//!
//! The backend data layer of the StudySync study-tracking platform: a chat
//! cache that keeps working when Redis goes away, and a replication engine
//! that mirrors the PostgreSQL primary store into MongoDB for backups.
//!
//! # Module Structure
//!
//! - **`shared`** - types shared by every component
//!   - `CachedMessage`, `PresenceEntry`
//!   - `AppConfig` and its builder
//!   - `SharedError`
//!
//! - **`backend`** - server-side code
//!   - `cache` - `CacheClient`, fast-path and in-process stores, write-behind queue
//!   - `replication` - `ReplicationSync`, mirrors, primary sources, backup scheduler
//!   - `server` / `routes` - composition root and operational HTTP routes (`ssr`)
//!
//! # Feature Flags
//!
//! - **`ssr`** (default) - axum server, operational routes, the
//!   `studysync-server` binary
//!
//! # Usage
//!
//! ```rust,no_run
//! use studysync::backend::cache::CacheClient;
//! use studysync::shared::{AppConfig, CachedMessage};
//!
//! # async fn example() {
//! let config = AppConfig::default();
//! let cache = CacheClient::init(&config).await;
//!
//! cache.cache_message("room-1", CachedMessage::new("room-1", "user-1", "hi")).await;
//! let recent = cache.get_cached_messages("room-1", 50).await;
//! assert_eq!(recent.len(), 1);
//! # }
//! ```
//!
//! # Degradation
//!
//! No external store is required. Without Redis the cache runs in process
//! memory; without MongoDB every replication call is a logged no-op; without
//! PostgreSQL the write-behind queue is not drained and full backups are off.

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
pub mod backend;

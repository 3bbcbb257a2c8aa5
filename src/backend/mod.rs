//! Backend Module
//!
//! Server-side chat cache and backup replication.
//!
//! - **`cache`** - `CacheClient` with Redis fast path, in-process fallback and
//!   write-behind queue
//! - **`replication`** - `ReplicationSync` mirroring PostgreSQL into MongoDB,
//!   scheduled full backups and JSON export
//! - **`error`** - backend error types
//! - **`server`** - application state and composition root (`ssr` feature)
//! - **`routes`** - operational HTTP routes (`ssr` feature)
//!
//! The cache and replication engines do not depend on axum and are available
//! without the `ssr` feature, so workers and tooling can embed them directly.

/// Chat cache
pub mod cache;

/// Backup replication
pub mod replication;

/// Backend error types
pub mod error;

/// Server setup and configuration
#[cfg(feature = "ssr")]
pub mod server;

/// Route configuration
#[cfg(feature = "ssr")]
pub mod routes;

pub use cache::{CacheClient, CacheStats};
pub use error::{CacheError, ReplicationError};
pub use replication::{BackupScheduler, ReplicationSync};

#[cfg(feature = "ssr")]
pub use error::BackendError;
#[cfg(feature = "ssr")]
pub use server::create_app;

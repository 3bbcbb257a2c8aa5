//! Replication Module
//!
//! One-way mirroring of the PostgreSQL primary store into a MongoDB backup
//! mirror, plus scheduled full backups and JSON export.
//!
//! - **`mirror`** - `MirrorRecord`, `BackupMetadata` and the `MirrorStore` trait
//! - **`mongo`** - `MongoMirror`
//! - **`memory`** - `MemoryMirror`
//! - **`source`** - `PrimarySource` with `PgSource` and `MemorySource`
//! - **`sync`** - `ReplicationSync`, the public API
//! - **`scheduler`** - `BackupScheduler`

pub mod memory;
pub mod mirror;
pub mod mongo;
pub mod scheduler;
pub mod source;
pub mod sync;

pub use memory::MemoryMirror;
pub use mirror::{BackupMetadata, BackupStatus, MirrorRecord, MirrorStore, METADATA_COLLECTION, SOURCE_TAG};
pub use mongo::MongoMirror;
pub use scheduler::{BackupHandle, BackupScheduler};
pub use source::{MemorySource, PgSource, PrimarySource};
pub use sync::ReplicationSync;

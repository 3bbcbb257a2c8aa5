//! Chat Cache Module
//!
//! Recent room messages, online users and typing markers, served from Redis
//! when it is reachable and from process memory when it is not.
//!
//! - **`selector`** - `BackendSelector`, the fast-path/fallback routing gate
//! - **`store`** - `ChatStore` trait shared by both backends
//! - **`memory`** - `InProcessStore`, the fallback
//! - **`redis_store`** - `RedisStore`, the fast path
//! - **`queue`** - `WriteBehindQueue` of messages awaiting persistence
//! - **`client`** - `CacheClient`, the public API
//! - **`drain`** - `QueueDrainer` moving queued messages into PostgreSQL

pub mod client;
pub mod drain;
pub mod memory;
pub mod queue;
pub mod redis_store;
pub mod selector;
pub mod store;

pub use client::{CacheClient, CacheStats, DEFAULT_MESSAGE_LIMIT};
pub use drain::{DrainHandle, MessageSink, PgMessageSink, QueueDrainer, MAX_PERSIST_ATTEMPTS};
pub use memory::InProcessStore;
pub use queue::WriteBehindQueue;
pub use redis_store::RedisStore;
pub use selector::BackendSelector;
pub use store::{CacheSettings, ChatStore, StoreKind};

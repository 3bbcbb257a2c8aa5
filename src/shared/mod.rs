//! Shared Module
//!
//! Platform-neutral types used by both the chat cache and the backup engine:
//! the cached message and presence records, the shared error type and the
//! application configuration.

/// Cached message and presence records
pub mod message;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use message::{CachedMessage, PresenceEntry};
pub use error::SharedError;
pub use config::{AppConfig, AppConfigBuilder, ConfigError, DEFAULT_COLLECTIONS};

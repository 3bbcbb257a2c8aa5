//! Backend Error Module
//!
//! - **`types`** - `CacheError`, `ReplicationError` and the HTTP-facing `BackendError`
//! - **`conversion`** - `IntoResponse` for `BackendError`

/// Error type definitions
pub mod types;

/// Error conversion implementations
#[cfg(feature = "ssr")]
pub mod conversion;

// Re-export commonly used types
pub use types::{CacheError, ReplicationError};
#[cfg(feature = "ssr")]
pub use types::BackendError;

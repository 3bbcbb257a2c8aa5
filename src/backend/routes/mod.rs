//! Route Configuration Module
//!
//! - **`router`** - router assembly, tracing layer and fallback
//! - **`ops_routes`** - operational backup and cache endpoints

/// Main router creation
pub mod router;

/// Operational endpoint handlers
pub mod ops_routes;

pub use router::create_router;

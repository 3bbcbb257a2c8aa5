//! Server Module
//!
//! - **`state`** - `AppState` and its `FromRef` implementations
//! - **`config`** - configuration and database loading
//! - **`init`** - `create_app`, the composition root

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use init::{create_app, App};
pub use state::AppState;

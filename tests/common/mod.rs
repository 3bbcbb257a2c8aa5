//! Common test utilities and helpers
//!
//! - Message and record builders
//! - A switchable `ChatStore` standing in for Redis
//! - Recording and rejecting test doubles for sinks and mirrors

#![allow(dead_code)]

pub mod stores;

pub use fixtures::*;
pub use stores::*;

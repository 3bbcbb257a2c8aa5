//! Integration tests for the chat cache, the drain worker and replication

#[path = "../common/mod.rs"]
mod common;

mod cache_test;
mod drain_test;
mod replication_test;

//! Property-based tests for the chat cache and mirror records
//!
//! Uses proptest to generate insert/remove sequences and primary records.

mod cache_proptest;
mod mirror_proptest;

//! Integration tests for calbridge-sync
//!
//! Runs the reconciler and the engine against in-memory calendar, record
//! and key-value stores.

mod common;

mod test_engine;

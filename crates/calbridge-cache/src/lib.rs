//! Calbridge Cache - Durable engine state
//!
//! SQLite-based key-value store for:
//! - Per-pair identity mappings
//! - Per-pair connection times
//! - The list of active pairs
//! - Sync statistics
//!
//! plus the [`WorkerLock`] that keeps a second sync worker off the same file.
//!
//! ## Architecture
//!
//! This crate implements the `IKeyValueStore` port from `calbridge-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use calbridge_cache::{DatabasePool, SqliteKeyValueStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/calbridge/state.db")).await?;
//! let store = SqliteKeyValueStore::new(pool.pool().clone());
//! // Use store as IKeyValueStore...
//! # Ok(())
//! # }
//! ```

pub mod kv_store;
pub mod lock;
pub mod pool;

pub use kv_store::SqliteKeyValueStore;
pub use lock::WorkerLock;
pub use pool::DatabasePool;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value is not valid JSON
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Another process holds the worker lock
    #[error("Another calbridge worker is already running (lock held on {0})")]
    WorkerBusy(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

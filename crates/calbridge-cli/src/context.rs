//! Wiring shared by the commands: state database, adapters and engine

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use calbridge_cache::{DatabasePool, SqliteKeyValueStore, WorkerLock};
use calbridge_core::config::Config;
use calbridge_core::domain::{CalendarId, DatabaseId, PairKey};
use calbridge_core::ports::IKeyValueStore;
use calbridge_remote::{GoogleCalendarStore, NotionRecordStore};
use calbridge_sync::{PairStateStore, SyncEngine};

/// Opens the state database and returns its key-value store
pub async fn open_kv(config: &Config) -> Result<(DatabasePool, Arc<dyn IKeyValueStore>)> {
    let path = &config.state.database;
    debug!(path = %path.display(), "Opening state database");
    let pool = DatabasePool::new(path)
        .await
        .with_context(|| format!("Failed to open state database {}", path.display()))?;
    let kv: Arc<dyn IKeyValueStore> = Arc::new(SqliteKeyValueStore::new(pool.pool().clone()));
    Ok((pool, kv))
}

/// Becomes the only sync worker for the configured state database
///
/// Fails at once if a daemon or another `calbridge sync` already holds it.
pub fn lock_worker(config: &Config) -> Result<WorkerLock> {
    let lock = WorkerLock::acquire(&config.state.database)
        .context("Cannot start syncing")?;
    debug!(lock = %lock.path().display(), "Holding worker lock");
    Ok(lock)
}

/// State store over the configured database, for commands that never touch
/// the remote services
pub async fn open_state(config: &Config) -> Result<(DatabasePool, PairStateStore)> {
    let (pool, kv) = open_kv(config).await?;
    Ok((pool, PairStateStore::new(kv)))
}

/// Engine wired to the configured calendar and record services
pub async fn open_engine(config: &Config) -> Result<(DatabasePool, SyncEngine)> {
    let calendar = GoogleCalendarStore::from_config(&config.calendar)
        .context("Failed to configure the calendar service")?;
    let records = NotionRecordStore::from_config(&config.records)
        .context("Failed to configure the record service")?;
    let (pool, kv) = open_kv(config).await?;
    let engine = SyncEngine::new(Arc::new(calendar), Arc::new(records), kv, config);
    Ok((pool, engine))
}

/// Parses a pair from its calendar and database ids
pub fn parse_pair(calendar: &str, database: &str) -> Result<PairKey> {
    let calendar_id = CalendarId::new(calendar).context("Invalid calendar id")?;
    let database_id = DatabaseId::new(database).context("Invalid database id")?;
    Ok(PairKey::new(calendar_id, database_id))
}

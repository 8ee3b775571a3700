//! SQLite pool for the engine state file
//!
//! One file holds every persisted key (identity maps, connection times,
//! active pairs, stats). The daemon writes it from its single worker while
//! `calbridge stats` or `calbridge pair list` may read it concurrently, which
//! is why the file runs in WAL mode. Committed writes use `synchronous=FULL`;
//! a link saved right after a remote create must not be lost to a crash.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::CacheError;

/// Embedded schema scripts, applied in order on every open
const MIGRATIONS: &[(&str, &str)] = &[(
    "20260301_kv_store",
    include_str!("migrations/20260301_kv_store.sql"),
)];

const MAX_CONNECTIONS: u32 = 4;

/// How long a writer waits on a CLI reader before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open state database with its migrations applied
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the state file at `db_path`
    ///
    /// Missing parent directories are created, so the default
    /// `~/.local/share/calbridge/state.db` works on a fresh install.
    ///
    /// # Errors
    /// [`CacheError::ConnectionFailed`] when the directory or file cannot be
    /// opened, [`CacheError::MigrationFailed`] when a schema script fails.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display()))
            })?;

        migrate(&pool).await?;
        info!(path = %db_path.display(), "State database opened");
        Ok(Self { pool })
    }

    /// Throwaway state for tests and dry runs
    ///
    /// Capped at one connection: every `:memory:` connection is its own
    /// database, so a second one would see empty state.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory state: {e}")))?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for in-flight statements, then closes every connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Scripts use `IF NOT EXISTS`, so re-running them on every open is harmless
async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
    for (name, sql) in MIGRATIONS {
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("{name}: {e}")))?;
    }
    debug!(applied = MIGRATIONS.len(), "State schema up to date");
    Ok(())
}

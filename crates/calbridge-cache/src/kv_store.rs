//! SQLite implementation of IKeyValueStore
//!
//! Values are stored as JSON text in a single `kv_store` table. Writes are
//! upserts; the statement has committed when `set` returns.
//!
//! ## Type Mapping
//!
//! | Port Type           | SQL Type | Strategy                              |
//! |---------------------|----------|---------------------------------------|
//! | key (`&str`)        | TEXT     | primary key                           |
//! | `serde_json::Value` | TEXT     | `serde_json::to_string` / `from_str`  |
//! | write time          | TEXT     | RFC 3339 via `to_rfc3339()`           |

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use calbridge_core::ports::IKeyValueStore;

use crate::CacheError;

/// SQLite-backed durable key-value store
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let text: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<(), CacheError> {
        let text = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All keys starting with `prefix`, sorted
    ///
    /// Used by the CLI to list stored pairs; the engine itself never scans.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query("SELECT key FROM kv_store WHERE key LIKE ? ESCAPE '\\' ORDER BY key")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(CacheError::from))
            .collect()
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.read(key).await?)
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.write(key, &value).await?;
        tracing::trace!(key, "State value written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(())
    }
}

//! Persisted engine state
//!
//! [`PairStateStore`] is the identity map store plus the rest of the engine's
//! durable state, all kept as JSON values in the key-value port:
//!
//! ```text
//! mapping:<pair storage key>          IdentityMapping
//! connection_time:<pair storage key>  RFC 3339 instant
//! active_pairs                        [PairKey]
//! sync_stats                          SyncStats
//! ```
//!
//! The pair storage key is `<calendar>::<database>` with `%` and `:` escaped
//! inside each id (see [`PairKey::storage_key`]).
//!
//! Every write is awaited before the calling method returns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use calbridge_core::domain::{IdentityMapping, PairKey, SyncStats};
use calbridge_core::ports::IKeyValueStore;

use crate::SyncError;

const ACTIVE_PAIRS_KEY: &str = "active_pairs";
const STATS_KEY: &str = "sync_stats";

fn mapping_key(pair: &PairKey) -> String {
    format!("mapping:{}", pair.storage_key())
}

fn connection_time_key(pair: &PairKey) -> String {
    format!("connection_time:{}", pair.storage_key())
}

/// Typed access to engine state in the key-value store
#[derive(Clone)]
pub struct PairStateStore {
    kv: Arc<dyn IKeyValueStore>,
}

impl PairStateStore {
    pub fn new(kv: Arc<dyn IKeyValueStore>) -> Self {
        Self { kv }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        let Some(value) = self.kv.get(key).await.map_err(SyncError::State)? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SyncError::State(anyhow::anyhow!("corrupt value under {key}: {e}")))
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        let value = serde_json::to_value(value)
            .map_err(|e| SyncError::State(anyhow::anyhow!("cannot encode {key}: {e}")))?;
        self.kv.set(key, value).await.map_err(SyncError::State)
    }

    // ========================================================================
    // Identity maps
    // ========================================================================

    /// Loads the identity mapping of a pair (empty if none was saved)
    pub async fn load_mapping(&self, pair: &PairKey) -> Result<IdentityMapping, SyncError> {
        let mapping: IdentityMapping = self.load(&mapping_key(pair)).await?.unwrap_or_default();
        if mapping.is_consistent() {
            return Ok(mapping);
        }
        warn!(pair = %pair, entries = mapping.len(), "Identity mapping inconsistent, repairing");
        Ok(mapping.repaired())
    }

    pub async fn save_mapping(&self, pair: &PairKey, mapping: &IdentityMapping) -> Result<(), SyncError> {
        debug!(pair = %pair, entries = mapping.len(), "Saving identity mapping");
        self.store(&mapping_key(pair), mapping).await
    }

    // ========================================================================
    // Connection times
    // ========================================================================

    pub async fn connection_time(&self, pair: &PairKey) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.load(&connection_time_key(pair)).await
    }

    /// Returns the pair's connection time, recording `sentinel` if none exists
    ///
    /// The first recorded value is permanent.
    pub async fn ensure_connection_time(
        &self,
        pair: &PairKey,
        sentinel: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SyncError> {
        if let Some(existing) = self.connection_time(pair).await? {
            return Ok(existing);
        }
        debug!(pair = %pair, since = %sentinel, "Recording first connection time");
        self.store(&connection_time_key(pair), &sentinel).await?;
        Ok(sentinel)
    }

    // ========================================================================
    // Active pairs
    // ========================================================================

    pub async fn active_pairs(&self) -> Result<Vec<PairKey>, SyncError> {
        Ok(self.load(ACTIVE_PAIRS_KEY).await?.unwrap_or_default())
    }

    /// Adds a pair to the active list; returns false if it was already active
    pub async fn add_active_pair(&self, pair: &PairKey) -> Result<bool, SyncError> {
        let mut pairs = self.active_pairs().await?;
        if pairs.contains(pair) {
            return Ok(false);
        }
        pairs.push(pair.clone());
        self.store(ACTIVE_PAIRS_KEY, &pairs).await?;
        Ok(true)
    }

    /// Removes a pair from the active list; returns false if it was not active
    pub async fn remove_active_pair(&self, pair: &PairKey) -> Result<bool, SyncError> {
        let mut pairs = self.active_pairs().await?;
        let before = pairs.len();
        pairs.retain(|p| p != pair);
        if pairs.len() == before {
            return Ok(false);
        }
        self.store(ACTIVE_PAIRS_KEY, &pairs).await?;
        Ok(true)
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub async fn load_stats(&self) -> Result<SyncStats, SyncError> {
        Ok(self.load(STATS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_stats(&self, stats: &SyncStats) -> Result<(), SyncError> {
        self.store(STATS_KEY, stats).await
    }
}

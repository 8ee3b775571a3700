//! Sync statistics and per-pass summaries

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pair::PairKey;

/// Cumulative counters, persisted across restarts
///
/// Only the engine worker mutates these, once per reconciled pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub succeeded: u64,
    pub failed: u64,
    pub total: u64,
    /// Pair storage key (see [`PairKey::storage_key`]) to time of its last successful pass
    pub last_synced: BTreeMap<String, DateTime<Utc>>,
}

impl SyncStats {
    pub fn record_success(&mut self, pair: &PairKey, at: DateTime<Utc>) {
        self.succeeded += 1;
        self.total += 1;
        self.last_synced.insert(pair.storage_key(), at);
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
        self.total += 1;
    }

    pub fn last_synced_at(&self, pair: &PairKey) -> Option<DateTime<Utc>> {
        self.last_synced.get(&pair.storage_key()).copied()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What one reconciliation pass of a pair did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub created_targets: u32,
    pub created_sources: u32,
    pub updated_targets: u32,
    pub updated_sources: u32,
    pub deleted_targets: u32,
    pub deleted_sources: u32,
    /// Unmapped duplicates linked by content instead of re-created
    pub adopted: u32,
    /// Deletions that failed and were dropped from the mapping anyway
    pub failed_deletes: u32,
}

impl ReconcileSummary {
    /// Number of writes issued against either store
    pub fn total_changes(&self) -> u32 {
        self.created_targets
            + self.created_sources
            + self.updated_targets
            + self.updated_sources
            + self.deleted_targets
            + self.deleted_sources
    }

    pub fn merge(&mut self, other: &Self) {
        self.created_targets += other.created_targets;
        self.created_sources += other.created_sources;
        self.updated_targets += other.updated_targets;
        self.updated_sources += other.updated_sources;
        self.deleted_targets += other.deleted_targets;
        self.deleted_sources += other.deleted_sources;
        self.adopted += other.adopted;
        self.failed_deletes += other.failed_deletes;
    }
}

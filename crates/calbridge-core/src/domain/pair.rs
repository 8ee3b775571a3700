//! Sync pairs and queued jobs

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{CalendarId, DatabaseId};

/// Identity of a (calendar, database) pair
///
/// The `Display` form `<calendar>::<database>` is for logs only. Persisted
/// state is keyed by [`storage_key`](Self::storage_key), which stays unique
/// when the ids themselves contain `::`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub calendar_id: CalendarId,
    pub database_id: DatabaseId,
}

impl PairKey {
    pub fn new(calendar_id: CalendarId, database_id: DatabaseId) -> Self {
        Self {
            calendar_id,
            database_id,
        }
    }

    /// Unambiguous `<calendar>::<database>` key for persisted state
    ///
    /// `%` and `:` inside either id are percent-escaped, so the only `::` left
    /// in the key is the separator. Ids without those characters map to the
    /// same text as `Display`.
    pub fn storage_key(&self) -> String {
        format!(
            "{}::{}",
            escape_key_part(self.calendar_id.as_str()),
            escape_key_part(self.database_id.as_str())
        )
    }
}

fn escape_key_part(part: &str) -> String {
    part.replace('%', "%25").replace(':', "%3A")
}

impl Display for PairKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.calendar_id, self.database_id)
    }
}

/// A pair as known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPair {
    pub key: PairKey,
    /// Records untouched since this instant are out of scope.
    /// `None` until the first activation records it.
    pub connection_time: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Unit of queued work
///
/// Duplicate enqueues collapse because the pending set is keyed by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncJob {
    /// Reconcile every active pair
    FullPoll,
    /// Reconcile one pair
    Pair(PairKey),
}

impl Display for SyncJob {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullPoll => write!(f, "full-poll"),
            Self::Pair(key) => write!(f, "{key}"),
        }
    }
}

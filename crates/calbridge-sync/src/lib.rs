//! Calbridge Sync - Poll-based bidirectional reconciliation
//!
//! Provides:
//! - Per-pair reconciliation between a calendar and a database
//! - Durable identity maps and connection times
//! - Debounced local-change collection and scheduled polling
//! - Fail-fast batch execution with exponential backoff
//!
//! ## Modules
//!
//! - [`state`] - Identity map store and other persisted engine state
//! - [`reconciler`] - The per-pair two-phase reconciliation pass
//! - [`collector`] - Pending job set with debounce deadline
//! - [`scheduler`] - Poll interval policy
//! - [`backoff`] - Retry delay after failed batches
//! - [`engine`] - [`SyncEngine`](engine::SyncEngine), the single worker tying it together

pub mod backoff;
pub mod collector;
pub mod engine;
pub mod reconciler;
pub mod scheduler;
pub mod state;

use calbridge_core::domain::{DomainError, PairKey};
use thiserror::Error;

pub use engine::{BatchOutcome, BatchReport, PairReport, SyncEngine};
pub use reconciler::{PairReconciler, ReconcileOptions};
pub use state::PairStateStore;

/// How the batch runner reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The pair's database cannot be bound; retried on the next tick, batch continues
    Schema,
    /// Network, rate limit or server failure; batch aborts and backs off
    Transient,
    /// Anything else; handled like a transient failure but logged as an error
    Fatal,
}

/// Errors that can occur during reconciliation
#[derive(Debug, Error)]
pub enum SyncError {
    /// The target database lacks a title or date property
    #[error("Schema error for {pair}: {reason}")]
    Schema { pair: PairKey, reason: String },

    /// A calendar store call failed
    #[error("Calendar store error: {0:#}")]
    Calendar(anyhow::Error),

    /// A record store call failed
    #[error("Record store error: {0:#}")]
    Records(anyhow::Error),

    /// Reading or writing persisted engine state failed
    #[error("State store error: {0:#}")]
    State(anyhow::Error),

    /// The listing window cannot be computed from the configured lookahead
    #[error("Invalid sync window: {0}")]
    Window(String),

    /// A domain-level error propagated from calbridge-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Classifies the error for the batch runner
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Schema { .. } => ErrorKind::Schema,
            SyncError::Calendar(e) | SyncError::Records(e) if is_transient_error(e) => {
                ErrorKind::Transient
            }
            _ => ErrorKind::Fatal,
        }
    }
}

/// Determines whether an adapter error is transient (retryable)
///
/// Transient errors include:
/// - Network errors (connection refused, timeout, DNS)
/// - Rate limiting (HTTP 429)
/// - Server errors (HTTP 5xx)
pub fn is_transient_error(err: &anyhow::Error) -> bool {
    let err_str = format!("{err:#}").to_lowercase();

    const MARKERS: &[&str] = &[
        "network",
        "connection",
        "timeout",
        "timed out",
        "dns",
        "reset by peer",
        "broken pipe",
        "429",
        "too many requests",
        "rate limit",
        "500",
        "502",
        "503",
        "504",
        "server error",
    ];
    MARKERS.iter().any(|m| err_str.contains(m))
}

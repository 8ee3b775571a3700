//! Change collector - pending job set with a debounce deadline
//!
//! Local edits and scheduler ticks both land here. Jobs are keyed by value,
//! so repeated enqueues of the same pair collapse into one pending job.
//!
//! ## Flow
//!
//! ```text
//! on_local_change(pair) ──→ pending += Pair(pair), deadline = now + debounce
//! enqueue_now(job)      ──→ pending += job,        deadline = now
//!                                    │
//!                           is_due(now) ──→ take_all() ──→ batch
//! ```

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use calbridge_core::domain::{PairKey, SyncJob};

/// Pending jobs plus the instant they become runnable
#[derive(Debug)]
pub struct ChangeCollector {
    pending: BTreeSet<SyncJob>,
    deadline: Option<Instant>,
    debounce: Duration,
    last_local_change: HashMap<PairKey, Instant>,
}

impl ChangeCollector {
    pub fn new(debounce: Duration) -> Self {
        Self {
            pending: BTreeSet::new(),
            deadline: None,
            debounce,
            last_local_change: HashMap::new(),
        }
    }

    /// Records a local edit to `pair` and restarts the debounce window
    ///
    /// A burst of edits keeps pushing the deadline out, so the burst costs
    /// exactly one reconciliation.
    pub fn on_local_change(&mut self, pair: PairKey) {
        let now = Instant::now();
        self.last_local_change.insert(pair.clone(), now);
        self.pending.insert(SyncJob::Pair(pair));
        self.deadline = Some(now + self.debounce);
        debug!(pending = self.pending.len(), "Local change collected");
    }

    /// Adds a job that should run at the next opportunity
    pub fn enqueue_now(&mut self, job: SyncJob) {
        self.pending.insert(job);
        self.deadline = Some(Instant::now());
    }

    /// Puts back the jobs of a failed batch, keeping any current deadline
    pub fn requeue(&mut self, jobs: impl IntoIterator<Item = SyncJob>) {
        self.pending.extend(jobs);
        if self.deadline.is_none() && !self.pending.is_empty() {
            self.deadline = Some(Instant::now());
        }
    }

    /// True when jobs are pending and the debounce window has closed
    pub fn is_due(&self, now: Instant) -> bool {
        !self.pending.is_empty() && self.deadline.map_or(true, |d| now >= d)
    }

    /// When the pending jobs become runnable, if any are pending
    pub fn deadline(&self) -> Option<Instant> {
        if self.pending.is_empty() {
            None
        } else {
            self.deadline
        }
    }

    /// Drains every pending job, in job order
    pub fn take_all(&mut self) -> Vec<SyncJob> {
        self.deadline = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pairs edited locally within `window` of now
    pub fn recently_active(&self, window: Duration) -> Vec<PairKey> {
        let now = Instant::now();
        let mut pairs: Vec<_> = self
            .last_local_change
            .iter()
            .filter(|(_, at)| now.duration_since(**at) <= window)
            .map(|(pair, _)| pair.clone())
            .collect();
        pairs.sort();
        pairs
    }
}

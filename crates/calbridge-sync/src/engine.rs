//! Sync engine - the single worker behind every reconciliation
//!
//! The [`SyncEngine`] owns the pending-job set, the poll scheduler and the
//! backoff controller, and runs batches of jobs through the
//! [`PairReconciler`] one pair at a time.
//!
//! ## Flow
//!
//! ```text
//! on_local_change ──┐                                   ┌─→ Ok      → stats, next pair
//! scheduler tick ───┼─→ pending set ──→ debounce ──→ batch ─→ Schema  → stats, next pair
//! activate_pair ────┘                                   └─→ other   → requeue batch, back off
//! ```
//!
//! A busy flag keeps batches single-flight: a trigger that arrives while a
//! batch runs only adds to the pending set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use calbridge_core::config::Config;
use calbridge_core::domain::{PairKey, ReconcileSummary, SyncJob, SyncStats};
use calbridge_core::ports::{ICalendarStore, IKeyValueStore, IRecordStore};
use calbridge_telemetry::MetricsRegistry;

use crate::backoff::BackoffController;
use crate::collector::ChangeCollector;
use crate::reconciler::{PairReconciler, ReconcileOptions};
use crate::scheduler::PairScheduler;
use crate::state::PairStateStore;
use crate::{ErrorKind, SyncError};

// ============================================================================
// Batch results
// ============================================================================

/// Result of reconciling one pair within a batch
#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub pair: PairKey,
    pub summary: Option<ReconcileSummary>,
    pub error: Option<String>,
}

/// Summary of one executed batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub pairs: Vec<PairReport>,
    /// True if a non-schema error stopped the batch
    pub aborted: bool,
    /// Jobs put back into the pending set
    pub requeued: usize,
    /// Backoff applied before the next batch may run
    pub next_retry_in: Option<Duration>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// Sum of all pair summaries
    pub fn totals(&self) -> ReconcileSummary {
        let mut totals = ReconcileSummary::default();
        for summary in self.pairs.iter().filter_map(|p| p.summary.as_ref()) {
            totals.merge(summary);
        }
        totals
    }
}

/// What [`SyncEngine::run_pending`] did
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Nothing was pending
    Idle,
    /// Another batch is running; pending jobs stay queued
    Busy,
    /// Backing off after a failed batch
    Deferred { remaining: Duration },
    Ran(BatchReport),
}

/// Clears the busy flag when a batch ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Poll-based bidirectional sync engine for calendar/database pairs
///
/// ## Dependencies
///
/// - `calendar`: calendar event store
/// - `records`: database record store
/// - `kv`: durable key-value store for identity maps, connection times,
///   the active-pair list and stats
pub struct SyncEngine {
    state: PairStateStore,
    reconciler: PairReconciler,
    collector: Mutex<ChangeCollector>,
    scheduler: Mutex<PairScheduler>,
    backoff: Mutex<BackoffController>,
    busy: AtomicBool,
    wake: Notify,
    backfill_since: DateTime<Utc>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SyncEngine {
    pub fn new(
        calendar: Arc<dyn ICalendarStore>,
        records: Arc<dyn IRecordStore>,
        kv: Arc<dyn IKeyValueStore>,
        config: &Config,
    ) -> Self {
        let state = PairStateStore::new(kv);
        let reconciler = PairReconciler::new(
            calendar,
            records,
            state.clone(),
            ReconcileOptions::from_config(config),
        );
        Self {
            state,
            reconciler,
            collector: Mutex::new(ChangeCollector::new(Duration::from_millis(
                config.sync.debounce_ms,
            ))),
            scheduler: Mutex::new(PairScheduler::from_config(&config.sync)),
            backoff: Mutex::new(BackoffController::from_config(&config.backoff)),
            busy: AtomicBool::new(false),
            wake: Notify::new(),
            backfill_since: config.sync.backfill_since,
            metrics: None,
        }
    }

    /// Attaches a metrics registry updated after every batch
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    // ========================================================================
    // Pair management
    // ========================================================================

    /// Starts syncing a pair and queues an immediate pass for it
    ///
    /// The first activation records the backfill instant as the pair's
    /// connection time, so the first pass covers existing history.
    pub async fn activate_pair(&self, pair: &PairKey) -> Result<(), SyncError> {
        let since = self
            .state
            .ensure_connection_time(pair, self.backfill_since)
            .await?;
        if self.state.add_active_pair(pair).await? {
            info!(pair = %pair, since = %since, "Pair activated");
        }
        self.collector
            .lock()
            .await
            .enqueue_now(SyncJob::Pair(pair.clone()));
        self.wake.notify_one();
        Ok(())
    }

    /// Stops syncing a pair; its identity map and connection time are kept
    pub async fn deactivate_pair(&self, pair: &PairKey) -> Result<(), SyncError> {
        if self.state.remove_active_pair(pair).await? {
            info!(pair = %pair, "Pair deactivated");
        }
        Ok(())
    }

    pub async fn active_pairs(&self) -> Result<Vec<PairKey>, SyncError> {
        self.state.active_pairs().await
    }

    pub async fn connection_time(&self, pair: &PairKey) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.state.connection_time(pair).await
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// Signals a local edit to `pair`; bursts collapse into one pass
    pub async fn on_local_change(&self, pair: PairKey) {
        self.collector.lock().await.on_local_change(pair);
        self.scheduler.lock().await.note_local_activity();
        self.wake.notify_one();
    }

    /// Queues a pass over every active pair, runnable immediately
    pub async fn request_full_sync(&self) {
        self.collector.lock().await.enqueue_now(SyncJob::FullPoll);
        self.wake.notify_one();
    }

    /// Feeds window focus to the adaptive interval policy
    pub async fn set_window_focused(&self, focused: bool) {
        self.scheduler.lock().await.set_focused(focused);
        self.wake.notify_one();
    }

    /// Delay the scheduler currently puts between full polls
    pub async fn next_poll_interval(&self) -> Duration {
        self.scheduler.lock().await.next_interval()
    }

    pub async fn pending_jobs(&self) -> usize {
        self.collector.lock().await.len()
    }

    /// Pairs edited locally within `window` of now
    pub async fn recently_active(&self, window: Duration) -> Vec<PairKey> {
        self.collector.lock().await.recently_active(window)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub async fn stats(&self) -> Result<SyncStats, SyncError> {
        self.state.load_stats().await
    }

    pub async fn reset_stats(&self) -> Result<(), SyncError> {
        info!("Resetting sync stats");
        self.state.save_stats(&SyncStats::default()).await
    }

    // ========================================================================
    // Batch execution
    // ========================================================================

    /// Runs every pending job now, ignoring the debounce deadline
    ///
    /// # Errors
    /// Only when persisted state cannot be read or written; the batch's jobs
    /// are requeued first.
    pub async fn run_pending(&self) -> Result<BatchOutcome, SyncError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Batch already running, leaving jobs queued");
            return Ok(BatchOutcome::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let now = Instant::now();
        if let Some(until) = self.backoff.lock().await.hold_until() {
            if now < until {
                return Ok(BatchOutcome::Deferred {
                    remaining: until - now,
                });
            }
        }

        let jobs = {
            let mut collector = self.collector.lock().await;
            if collector.is_empty() {
                return Ok(BatchOutcome::Idle);
            }
            collector.take_all()
        };
        self.report_pending().await;

        let report = match self.execute(&jobs).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, jobs = jobs.len(), "Batch failed before reconciling");
                self.fail_batch(jobs).await;
                return Err(e);
            }
        };

        let report = if report.aborted {
            let requeued = jobs.len();
            let delay = self.fail_batch(jobs).await;
            BatchReport {
                requeued,
                next_retry_in: Some(delay),
                ..report
            }
        } else {
            self.backoff.lock().await.on_success();
            self.scheduler
                .lock()
                .await
                .record_pass(report.totals().total_changes() > 0);
            if let Some(metrics) = &self.metrics {
                metrics.set_backoff_delay_ms(0);
            }
            report
        };

        info!(
            pairs = report.pairs.len(),
            aborted = report.aborted,
            requeued = report.requeued,
            duration_ms = report.duration_ms,
            "Batch completed"
        );
        Ok(BatchOutcome::Ran(report))
    }

    /// Reconciles the pairs named by `jobs`, stopping at the first non-schema error
    async fn execute(&self, jobs: &[SyncJob]) -> Result<BatchReport, SyncError> {
        let start = std::time::Instant::now();
        let pairs = self.expand(jobs).await?;
        let mut stats = self.state.load_stats().await?;
        let mut report = BatchReport::default();

        debug!(jobs = jobs.len(), pairs = pairs.len(), "Starting batch");

        for pair in pairs {
            let pair_start = std::time::Instant::now();
            let result = self.reconcile_pair(&pair).await;
            let elapsed = pair_start.elapsed().as_secs_f64();

            match result {
                Ok(summary) => {
                    stats.record_success(&pair, Utc::now());
                    self.record_metrics("success", elapsed, Some(&summary));
                    report.pairs.push(PairReport {
                        pair,
                        summary: Some(summary),
                        error: None,
                    });
                }
                Err(e) => {
                    stats.record_failure();
                    let kind = e.kind();
                    match kind {
                        ErrorKind::Schema => {
                            warn!(pair = %pair, error = %e, "Skipping pair with unusable schema");
                        }
                        ErrorKind::Transient => {
                            warn!(pair = %pair, error = %e, "Transient failure, aborting batch");
                        }
                        ErrorKind::Fatal => {
                            error!(pair = %pair, error = %e, "Reconciliation failed, aborting batch");
                        }
                    }
                    self.record_metrics("failure", elapsed, None);
                    report.pairs.push(PairReport {
                        pair,
                        summary: None,
                        error: Some(e.to_string()),
                    });
                    if kind != ErrorKind::Schema {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        self.state.save_stats(&stats).await?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Resolves jobs to active pairs, without duplicates, in job order
    async fn expand(&self, jobs: &[SyncJob]) -> Result<Vec<PairKey>, SyncError> {
        let active = self.state.active_pairs().await?;
        let mut pairs: Vec<PairKey> = Vec::new();
        for job in jobs {
            let candidates: Vec<&PairKey> = match job {
                SyncJob::FullPoll => active.iter().collect(),
                SyncJob::Pair(pair) if active.contains(pair) => vec![pair],
                SyncJob::Pair(pair) => {
                    debug!(pair = %pair, "Dropping job for inactive pair");
                    Vec::new()
                }
            };
            for pair in candidates {
                if !pairs.contains(pair) {
                    pairs.push(pair.clone());
                }
            }
        }
        Ok(pairs)
    }

    async fn reconcile_pair(&self, pair: &PairKey) -> Result<ReconcileSummary, SyncError> {
        let since = self
            .state
            .ensure_connection_time(pair, self.backfill_since)
            .await?;
        self.reconciler.reconcile(pair, since).await
    }

    /// Requeues `jobs` and starts the backoff hold; returns the delay applied
    async fn fail_batch(&self, jobs: Vec<SyncJob>) -> Duration {
        self.collector.lock().await.requeue(jobs);
        let delay = self.backoff.lock().await.on_failure();
        warn!(delay_ms = delay.as_millis() as u64, "Batch requeued, backing off");
        if let Some(metrics) = &self.metrics {
            metrics.set_backoff_delay_ms(delay.as_millis() as u64);
        }
        self.report_pending().await;
        delay
    }

    fn record_metrics(&self, status: &str, elapsed_secs: f64, summary: Option<&ReconcileSummary>) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.record_reconciliation(status, elapsed_secs);
        if let Some(s) = summary {
            metrics.record_operations("database", "create", s.created_targets.into());
            metrics.record_operations("database", "update", s.updated_targets.into());
            metrics.record_operations("database", "archive", s.deleted_targets.into());
            metrics.record_operations("calendar", "create", s.created_sources.into());
            metrics.record_operations("calendar", "update", s.updated_sources.into());
            metrics.record_operations("calendar", "delete", s.deleted_sources.into());
        }
    }

    async fn report_pending(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_pending_jobs(self.collector.lock().await.len());
        }
    }

    // ========================================================================
    // Worker loop
    // ========================================================================

    /// Runs the scheduler and flushes batches until `cancel` fires
    ///
    /// A batch already running when cancellation arrives completes first.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Sync engine started");
        let mut last_tick = Instant::now();
        let mut next_tick = last_tick;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let now = Instant::now();
            let interval = self.scheduler.lock().await.next_interval();
            next_tick = next_tick.min(last_tick + interval);

            if now >= next_tick {
                match self.state.active_pairs().await {
                    Ok(active) if !active.is_empty() => {
                        debug!(pairs = active.len(), "Scheduled full poll");
                        self.collector.lock().await.enqueue_now(SyncJob::FullPoll);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Failed to read active pairs"),
                }
                last_tick = now;
                next_tick = now + self.scheduler.lock().await.next_interval();
            }

            let (due, flush_at) = {
                let collector = self.collector.lock().await;
                let backoff = self.backoff.lock().await;
                let due = collector.is_due(now) && backoff.ready(now);
                let flush_at = collector
                    .deadline()
                    .map(|d| backoff.hold_until().map_or(d, |hold| d.max(hold)));
                (due, flush_at)
            };

            if due {
                if let Err(e) = self.run_pending().await {
                    error!(error = %e, "Batch failed");
                }
                continue;
            }

            let wake_at = flush_at.map_or(next_tick, |at| at.min(next_tick));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(wake_at) => {}
                _ = self.wake.notified() => {}
            }
        }

        info!("Sync engine stopped");
    }
}

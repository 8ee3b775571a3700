//! Prometheus metrics registry for calbridge
//!
//! Typed, labeled metrics for reconciliation passes, store writes, the
//! pending-job queue and the retry backoff.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: pair reconciliations by status (`success`, `schema_error`, `failure`)
    pub reconciliations_total: IntCounterVec,
    /// Counter: writes issued by (side, operation)
    pub record_operations_total: IntCounterVec,
    /// Gauge: jobs waiting in the pending set
    pub pending_jobs: IntGauge,
    /// Gauge: current retry delay in milliseconds (0 when healthy)
    pub backoff_delay_ms: IntGauge,
    /// Histogram: wall-clock duration of one pair reconciliation
    pub reconcile_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("calbridge".to_string()), None)?;

        let reconciliations_total = IntCounterVec::new(
            Opts::new("reconciliations_total", "Pair reconciliations by outcome"),
            &["status"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let record_operations_total = IntCounterVec::new(
            Opts::new(
                "record_operations_total",
                "Writes issued against the calendar and database stores",
            ),
            &["side", "operation"],
        )?;
        registry.register(Box::new(record_operations_total.clone()))?;

        let pending_jobs = IntGauge::new("pending_jobs", "Jobs waiting for the next batch")?;
        registry.register(Box::new(pending_jobs.clone()))?;

        let backoff_delay_ms = IntGauge::new(
            "backoff_delay_ms",
            "Delay before the next batch after a failure",
        )?;
        registry.register(Box::new(backoff_delay_ms.clone()))?;

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "reconcile_duration_seconds",
                "Duration of one pair reconciliation in seconds",
            )
            .buckets(vec![0.5, 1.0, 5.0, 15.0, 60.0, f64::INFINITY]),
            &["status"],
        )?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            reconciliations_total,
            record_operations_total,
            pending_jobs,
            backoff_delay_ms,
            reconcile_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record the outcome and duration of one pair reconciliation.
    pub fn record_reconciliation(&self, status: &str, duration_secs: f64) {
        self.reconciliations_total.with_label_values(&[status]).inc();
        self.reconcile_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    /// Record `count` writes of one kind (`side` is `calendar` or `database`).
    pub fn record_operations(&self, side: &str, operation: &str, count: u64) {
        if count > 0 {
            self.record_operations_total
                .with_label_values(&[side, operation])
                .inc_by(count);
        }
    }

    pub fn set_pending_jobs(&self, count: usize) {
        self.pending_jobs.set(count as i64);
    }

    pub fn set_backoff_delay_ms(&self, delay_ms: u64) {
        self.backoff_delay_ms.set(delay_ms as i64);
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

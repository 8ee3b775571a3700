//! Sync command - Reconcile pairs now
//!
//! Provides the `calbridge sync` CLI command which:
//! 1. Takes the worker lock, refusing to run beside a daemon
//! 2. Wires the configured calendar and record services into a `SyncEngine`
//! 3. Queues every active pair, or just the one given with `--pair`
//! 4. Runs a single batch and prints the per-pair results

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tracing::info;

use calbridge_core::config::Config;
use calbridge_sync::{BatchOutcome, BatchReport};

use crate::context::{lock_worker, open_engine, parse_pair};
use crate::output::{get_formatter, summary_line, OutputFormat, OutputFormatter};

/// Arguments for the sync subcommand
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Only reconcile this pair (it must be active)
    #[arg(long, num_args = 2, value_names = ["CALENDAR", "DATABASE"])]
    pub pair: Option<Vec<String>>,
}

impl SyncCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let _lock = lock_worker(config)?;
        let (pool, engine) = open_engine(config).await?;

        let active = engine.active_pairs().await?;
        match self.pair.as_deref() {
            Some([calendar, database]) => {
                let pair = parse_pair(calendar, database)?;
                if !active.contains(&pair) {
                    formatter.warn(&format!(
                        "Pair {pair} is not active. Run 'calbridge pair activate {calendar} {database}' first."
                    ));
                    pool.close().await;
                    return Ok(());
                }
                info!(pair = %pair, "Reconciling single pair");
                engine.on_local_change(pair).await;
            }
            _ => {
                if active.is_empty() {
                    formatter.info("No active pairs to sync");
                    if format.is_json() {
                        formatter.print_json(&report_json(&BatchReport::default()));
                    }
                    pool.close().await;
                    return Ok(());
                }
                engine.request_full_sync().await;
            }
        }

        let outcome = engine.run_pending().await;
        pool.close().await;

        match outcome? {
            BatchOutcome::Ran(report) => {
                if format.is_json() {
                    formatter.print_json(&report_json(&report));
                } else {
                    print_report(formatter.as_ref(), &report);
                }
                if report.aborted {
                    anyhow::bail!("Sync batch aborted; {} job(s) left pending", report.requeued);
                }
                Ok(())
            }
            BatchOutcome::Idle => {
                formatter.success("Nothing to sync");
                Ok(())
            }
            BatchOutcome::Busy => {
                formatter.warn("Another batch is already running");
                Ok(())
            }
            BatchOutcome::Deferred { remaining } => {
                formatter.warn(&format!(
                    "Backing off; retry in {}ms",
                    remaining.as_millis()
                ));
                Ok(())
            }
        }
    }
}

fn print_report(formatter: &dyn OutputFormatter, report: &BatchReport) {
    for pair in &report.pairs {
        match (&pair.summary, &pair.error) {
            (Some(summary), _) => {
                formatter.success(&format!("{}: {}", pair.pair, summary_line(summary)))
            }
            (None, Some(error)) => formatter.error(&format!("{}: {}", pair.pair, error)),
            (None, None) => formatter.info(&format!("{}: skipped", pair.pair)),
        }
    }
    let totals = report.totals();
    formatter.info(&format!(
        "{} change(s) across {} pair(s) in {}ms",
        totals.total_changes(),
        report.pairs.len(),
        report.duration_ms
    ));
    if let Some(delay) = report.next_retry_in {
        formatter.warn(&format!(
            "{} job(s) requeued; next attempt in {}ms",
            report.requeued,
            delay.as_millis()
        ));
    }
}

fn report_json(report: &BatchReport) -> serde_json::Value {
    let totals = report.totals();
    json!({
        "success": !report.aborted,
        "pairs": report.pairs.iter().map(|p| json!({
            "pair": p.pair.to_string(),
            "summary": p.summary,
            "error": p.error,
        })).collect::<Vec<_>>(),
        "totals": totals,
        "changes": totals.total_changes(),
        "requeued": report.requeued,
        "next_retry_ms": report.next_retry_in.map(|d| d.as_millis() as u64),
        "duration_ms": report.duration_ms,
    })
}

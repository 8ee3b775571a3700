//! Stats command - Show or reset sync statistics

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use tracing::info;

use calbridge_core::config::Config;
use calbridge_core::domain::SyncStats;
use calbridge_sync::PairStateStore;

use crate::context::open_state;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Zero the counters and forget last-sync times
    #[arg(long)]
    pub reset: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let (pool, state) = open_state(config).await?;
        let result = self.execute_with(&state, format).await;
        pool.close().await;
        result
    }

    async fn execute_with(&self, state: &PairStateStore, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if self.reset {
            info!("Resetting sync stats");
            state
                .save_stats(&SyncStats::default())
                .await
                .context("Failed to reset stats")?;
            if format.is_json() {
                formatter.print_json(&json!({ "success": true, "reset": true }));
            } else {
                formatter.success("Sync statistics reset");
            }
            return Ok(());
        }

        let stats = state.load_stats().await.context("Failed to read stats")?;
        if format.is_json() {
            formatter.print_json(&json!({
                "succeeded": stats.succeeded,
                "failed": stats.failed,
                "total": stats.total,
                "last_synced": stats.last_synced,
            }));
            return Ok(());
        }

        formatter.success("Sync statistics");
        formatter.info(&format!("Succeeded: {}", stats.succeeded));
        formatter.info(&format!("Failed:    {}", stats.failed));
        formatter.info(&format!("Total:     {}", stats.total));
        if stats.last_synced.is_empty() {
            formatter.info("Last synced: never");
        } else {
            formatter.info("Last synced:");
            for (pair, at) in &stats.last_synced {
                formatter.info(&format!("  {pair}  {}", at.to_rfc3339()));
            }
        }
        Ok(())
    }
}

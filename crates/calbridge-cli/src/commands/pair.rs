//! Pair command - Manage synchronized calendar/database pairs
//!
//! Activation records the pair's connection time (on first activation only)
//! and adds it to the active set; a running daemon picks it up on its next
//! poll. Deactivation keeps the identity map so a later reactivation resumes
//! where it left off.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;

use calbridge_core::config::Config;
use calbridge_sync::PairStateStore;

use crate::context::{open_state, parse_pair};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum PairCommand {
    /// Start syncing a calendar with a database
    Activate {
        /// Calendar id (e.g. "primary")
        calendar: String,
        /// Database id
        database: String,
    },
    /// Stop syncing a pair; its links are kept
    Deactivate { calendar: String, database: String },
    /// List active pairs
    List,
}

impl PairCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let (pool, state) = open_state(config).await?;
        let result = self.execute_with(&state, config, format).await;
        pool.close().await;
        result
    }

    async fn execute_with(
        &self,
        state: &PairStateStore,
        config: &Config,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);

        match self {
            PairCommand::Activate { calendar, database } => {
                let pair = parse_pair(calendar, database)?;
                let since = state
                    .ensure_connection_time(&pair, config.sync.backfill_since)
                    .await
                    .context("Failed to record connection time")?;
                let added = state
                    .add_active_pair(&pair)
                    .await
                    .context("Failed to activate pair")?;

                if format.is_json() {
                    formatter.print_json(&json!({
                        "success": true,
                        "pair": pair.to_string(),
                        "newly_active": added,
                        "connection_time": since,
                    }));
                } else if added {
                    formatter.success(&format!("Activated {pair}"));
                    formatter.info(&format!("Syncing changes since {}", since.to_rfc3339()));
                } else {
                    formatter.success(&format!("{pair} is already active"));
                }
            }
            PairCommand::Deactivate { calendar, database } => {
                let pair = parse_pair(calendar, database)?;
                let removed = state
                    .remove_active_pair(&pair)
                    .await
                    .context("Failed to deactivate pair")?;

                if format.is_json() {
                    formatter.print_json(&json!({
                        "success": true,
                        "pair": pair.to_string(),
                        "was_active": removed,
                    }));
                } else if removed {
                    formatter.success(&format!("Deactivated {pair}"));
                } else {
                    formatter.warn(&format!("{pair} was not active"));
                }
            }
            PairCommand::List => {
                let pairs = state.active_pairs().await.context("Failed to read pairs")?;
                let mut rows = Vec::with_capacity(pairs.len());
                for pair in &pairs {
                    let since = state.connection_time(pair).await?;
                    let links = state.load_mapping(pair).await?.len();
                    rows.push((pair, since, links));
                }

                if format.is_json() {
                    let items: Vec<_> = rows
                        .iter()
                        .map(|(pair, since, links)| {
                            json!({
                                "calendar_id": pair.calendar_id.as_str(),
                                "database_id": pair.database_id.as_str(),
                                "connection_time": since,
                                "links": links,
                            })
                        })
                        .collect();
                    formatter.print_json(&json!({ "pairs": items }));
                } else if rows.is_empty() {
                    formatter.info("No active pairs");
                } else {
                    formatter.success(&format!("{} active pair(s)", rows.len()));
                    for (pair, since, links) in rows {
                        let since = since
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string());
                        formatter.info(&format!("{pair}  since {since}  {links} link(s)"));
                    }
                }
            }
        }

        Ok(())
    }
}

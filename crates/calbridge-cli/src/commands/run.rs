//! Run command - the long-running sync daemon
//!
//! Takes the worker lock, wires the adapters into a `SyncEngine`, optionally
//! serves `/metrics`, and runs the engine's worker loop until SIGINT or
//! SIGTERM. A second daemon, or a `calbridge sync` started while this one
//! runs, is refused.
//!
//! ## Shutdown
//!
//! ```text
//! SIGINT/SIGTERM ─→ CancellationToken ─┬─→ engine loop (finishes running batch)
//!                                      └─→ metrics server
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use calbridge_core::config::Config;
use calbridge_telemetry::{MetricsRegistry, MetricsServer};

use crate::context::{lock_worker, open_engine};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Serve Prometheus metrics even if disabled in the config
    #[arg(long)]
    pub metrics: bool,

    /// Queue a full pass over all active pairs at startup
    #[arg(long)]
    pub sync_now: bool,
}

impl RunCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        info!("calbridge daemon starting");

        let errors = config.validate();
        if !errors.is_empty() {
            for e in &errors {
                error!(field = %e.field, "{}", e.message);
            }
            anyhow::bail!("Configuration has {} error(s)", errors.len());
        }

        let lock = lock_worker(config)?;

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal(signal_token).await;
        });

        let (pool, engine) = open_engine(config).await?;

        let metrics_task = if self.metrics || config.telemetry.metrics_enabled {
            let registry =
                Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
            let server = MetricsServer::new(Arc::clone(&registry), &config.telemetry.metrics_endpoint)
                .context("Invalid telemetry.metrics_endpoint")?;
            let token = shutdown.child_token();
            let task = tokio::spawn(async move {
                if let Err(e) = server.run(token).await {
                    error!(error = %format!("{e:#}"), "Metrics server failed");
                }
            });
            Some((registry, task))
        } else {
            None
        };

        let engine = match &metrics_task {
            Some((registry, _)) => engine.with_metrics(Arc::clone(registry)),
            None => engine,
        };

        let active = engine.active_pairs().await?;
        if active.is_empty() {
            warn!("No active pairs. Run 'calbridge pair activate <calendar> <database>' to add one.");
        } else {
            info!(pairs = active.len(), "Loaded active pairs");
        }
        if self.sync_now {
            engine.request_full_sync().await;
        }

        engine.run(shutdown.clone()).await;

        if let Some((_, task)) = metrics_task {
            shutdown.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "Metrics server task ended abnormally");
            }
        }
        pool.close().await;
        lock.release();

        info!("calbridge daemon shut down gracefully");
        Ok(())
    }
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

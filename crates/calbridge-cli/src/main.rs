//! calbridge CLI - Command-line interface for calbridge
//!
//! Provides commands for:
//! - Running the sync daemon
//! - Triggering a one-off reconciliation batch
//! - Activating and deactivating calendar/database pairs
//! - Viewing and resetting sync statistics
//! - Inspecting and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use calbridge_core::config::Config;

mod commands;
mod context;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, pair::PairCommand, run::RunCommand,
    stats::StatsCommand, sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "calbridge",
    version,
    about = "Two-way sync between calendars and databases"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the sync daemon until interrupted
    Run(RunCommand),
    /// Reconcile pending pairs now and print the result
    Sync(SyncCommand),
    /// Manage synchronized calendar/database pairs
    #[command(subcommand)]
    Pair(PairCommand),
    /// Show or reset sync statistics
    Stats(StatsCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}

/// Picks the log filter: `RUST_LOG` first, then `-v`, then the config file
fn log_filter(verbose: u8, quiet: bool, configured: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match (verbose, quiet) {
        (0, true) => "warn",
        (0, false) => configured,
        (1, _) => "debug",
        _ => "trace",
    };
    EnvFilter::new(level)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let config = Config::load_or_default(&config_path);

    // Setup tracing
    let env_filter = log_filter(cli.verbose, cli.quiet, &config.logging.level);
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else if cli.quiet {
        OutputFormat::Quiet
    } else {
        OutputFormat::Human
    };

    match &cli.command {
        Commands::Run(cmd) => cmd.execute(&config).await,
        Commands::Sync(cmd) => cmd.execute(&config, format).await,
        Commands::Pair(cmd) => cmd.execute(&config, format).await,
        Commands::Stats(cmd) => cmd.execute(&config, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}

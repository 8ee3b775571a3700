//! Config command - View and manage calbridge configuration
//!
//! Provides the `calbridge config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON), tokens redacted
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use tracing::info;

use calbridge_core::config::{Config, IntervalPolicy};

use crate::output::{get_formatter, OutputFormat};

const REDACTED: &str = "<redacted>";

/// Keys accepted by `config set`, with a short description
const SETTABLE_KEYS: &[(&str, &str)] = &[
    ("sync.poll_interval_secs", "Seconds between full polls"),
    ("sync.debounce_ms", "Quiet period after a local edit"),
    ("sync.lookahead_days", "How far ahead calendar events are listed"),
    ("sync.backfill_since", "First-run connection time (RFC 3339)"),
    ("sync.interval_policy", "fixed|adaptive"),
    ("sync.adaptive_max_interval_secs", "Longest adaptive poll interval"),
    ("backoff.base_ms", "First retry delay after a failed batch"),
    ("backoff.max_ms", "Retry delay cap"),
    ("schema.date_property", "Date property name, or 'none' to auto-detect"),
    ("schema.body_property", "Rich-text property holding the description"),
    ("calendar.base_url", "Calendar API base URL"),
    ("calendar.access_token", "Calendar API bearer token"),
    ("records.base_url", "Record API base URL"),
    ("records.access_token", "Record API bearer token"),
    ("records.api_version", "Record API version header"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "true|false"),
    ("telemetry.metrics_enabled", "true|false"),
    ("telemetry.metrics_endpoint", "Metrics listen address"),
    ("state.database", "State database path"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.poll_interval_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(config_path, format),
            ConfigCommand::Set { key, value } => {
                self.execute_set(config_path, key, value, format)
            }
            ConfigCommand::Validate => self.execute_validate(config_path, format),
        }
    }

    fn execute_show(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = redacted(Config::load_or_default(config_path));

        info!(config_path = %config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_set(
        &self,
        config_path: &Path,
        key: &str,
        value: &str,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let mut config = Config::load_or_default(config_path);
        let shown = if key.ends_with("access_token") { REDACTED } else { value };

        info!(key = %key, value = %shown, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": format!("{e:#}"),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {:#}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, description) in SETTABLE_KEYS {
                    formatter.info(&format!("  {name:<34} - {description}"));
                }
            }
            return Ok(());
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{}': {}",
                    key,
                    messages.join("; ")
                ));
            }
            return Ok(());
        }

        save(&config, config_path)?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": shown,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, shown));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if !config_path.exists() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                formatter.info(
                    "Using default configuration. Run 'calbridge config set <key> <value>' to create one.",
                );
            }
            return Ok(());
        }

        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {e}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");

        let errors = config.validate();
        if format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

fn redacted(mut config: Config) -> Config {
    if config.calendar.access_token.is_some() {
        config.calendar.access_token = Some(REDACTED.to_string());
    }
    if config.records.access_token.is_some() {
        config.records.access_token = Some(REDACTED.to_string());
    }
    config
}

fn save(config: &Config, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .context("Expected 'true' or 'false'")
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.poll_interval_secs" => {
            config.sync.poll_interval_secs =
                value.parse().context("Expected a positive integer")?;
        }
        "sync.debounce_ms" => {
            config.sync.debounce_ms = value.parse().context("Expected a positive integer")?;
        }
        "sync.lookahead_days" => {
            config.sync.lookahead_days = value.parse().context("Expected a number of days")?;
        }
        "sync.backfill_since" => {
            config.sync.backfill_since = value
                .parse::<DateTime<Utc>>()
                .context("Expected an RFC 3339 timestamp")?;
        }
        "sync.interval_policy" => {
            config.sync.interval_policy = match value {
                "fixed" => IntervalPolicy::Fixed,
                "adaptive" => IntervalPolicy::Adaptive,
                other => anyhow::bail!("Unknown interval policy '{}'", other),
            };
        }
        "sync.adaptive_max_interval_secs" => {
            config.sync.adaptive_max_interval_secs =
                value.parse().context("Expected a positive integer")?;
        }

        // --- backoff ---
        "backoff.base_ms" => {
            config.backoff.base_ms = value.parse().context("Expected a positive integer")?;
        }
        "backoff.max_ms" => {
            config.backoff.max_ms = value.parse().context("Expected a positive integer")?;
        }

        // --- schema ---
        "schema.date_property" => config.schema.date_property = optional(value),
        "schema.body_property" => config.schema.body_property = value.to_string(),

        // --- services ---
        "calendar.base_url" => config.calendar.base_url = value.to_string(),
        "calendar.access_token" => config.calendar.access_token = optional(value),
        "records.base_url" => config.records.base_url = value.to_string(),
        "records.access_token" => config.records.access_token = optional(value),
        "records.api_version" => config.records.api_version = value.to_string(),

        // --- logging / telemetry / state ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => config.logging.json = parse_bool(value)?,
        "telemetry.metrics_enabled" => config.telemetry.metrics_enabled = parse_bool(value)?,
        "telemetry.metrics_endpoint" => config.telemetry.metrics_endpoint = value.to_string(),
        "state.database" => config.state.database = PathBuf::from(value),

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}

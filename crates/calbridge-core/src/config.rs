//! Configuration module for calbridge.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Every section is optional in the file; missing sections and fields take
//! their defaults.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for calbridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub backoff: BackoffConfig,
    pub schema: SchemaConfig,
    pub calendar: CalendarConfig,
    pub records: RecordsConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
    pub state: StateConfig,
}

/// How the poll interval is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPolicy {
    /// Poll every `poll_interval_secs` while any pair is active.
    Fixed,
    /// Stretch the interval while the window is unfocused and passes find no changes.
    Adaptive,
}

/// Reconciliation scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduled full polls.
    pub poll_interval_secs: u64,
    /// Quiet period after a local change before the pending batch runs.
    pub debounce_ms: u64,
    /// How far into the future calendar events are fetched.
    pub lookahead_days: i64,
    /// Connection time recorded for a pair on first activation.
    pub backfill_since: DateTime<Utc>,
    pub interval_policy: IntervalPolicy,
    /// Upper bound for the adaptive interval.
    pub adaptive_max_interval_secs: u64,
}

/// Retry delays after a failed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
}

/// Database schema binding hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Date property to use when a database has several. `None` picks the first.
    pub date_property: Option<String>,
    /// Rich-text property receiving event descriptions, when present.
    pub body_property: String,
}

/// Calendar API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub base_url: String,
    /// Bearer token. Obtaining and refreshing it happens outside calbridge.
    pub access_token: Option<String>,
}

/// Records API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    /// Value of the API version header.
    pub api_version: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Prometheus endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub metrics_enabled: bool,
    /// `host:port` the `/metrics` server binds to.
    pub metrics_endpoint: String,
}

/// Location of the engine state database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub database: PathBuf,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/calbridge/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("calbridge")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// First-run connection time: far enough back to pick up existing content.
pub fn default_backfill_since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            debounce_ms: 1000,
            lookahead_days: 365,
            backfill_since: default_backfill_since(),
            interval_policy: IntervalPolicy::Fixed,
            adaptive_max_interval_secs: 300,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 60_000,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            date_property: None,
            body_property: "Description".to_string(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            access_token: None,
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com/v1".to_string(),
            access_token: None,
            api_version: "2022-06-28".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_endpoint: "127.0.0.1:9464".to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("calbridge")
                .join("state.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

/// Upper bound for `sync.lookahead_days` (about a century)
pub const MAX_LOOKAHEAD_DAYS: i64 = 36_500;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        positive(&mut errors, "sync.poll_interval_secs", self.sync.poll_interval_secs);
        positive(&mut errors, "sync.debounce_ms", self.sync.debounce_ms);
        if self.sync.lookahead_days <= 0 {
            errors.push(ValidationError {
                field: "sync.lookahead_days".into(),
                message: "must be greater than 0".into(),
            });
        } else if self.sync.lookahead_days > MAX_LOOKAHEAD_DAYS {
            errors.push(ValidationError {
                field: "sync.lookahead_days".into(),
                message: format!("must be at most {MAX_LOOKAHEAD_DAYS}"),
            });
        }
        if self.sync.backfill_since >= Utc::now() {
            errors.push(ValidationError {
                field: "sync.backfill_since".into(),
                message: "must be in the past".into(),
            });
        }
        if self.sync.interval_policy == IntervalPolicy::Adaptive
            && self.sync.adaptive_max_interval_secs < self.sync.poll_interval_secs
        {
            errors.push(ValidationError {
                field: "sync.adaptive_max_interval_secs".into(),
                message: "must be at least sync.poll_interval_secs".into(),
            });
        }

        // --- backoff ---
        positive(&mut errors, "backoff.base_ms", self.backoff.base_ms);
        if self.backoff.max_ms < self.backoff.base_ms {
            errors.push(ValidationError {
                field: "backoff.max_ms".into(),
                message: format!(
                    "({}) must be at least backoff.base_ms ({})",
                    self.backoff.max_ms, self.backoff.base_ms
                ),
            });
        }

        // --- schema ---
        if self.schema.body_property.trim().is_empty() {
            errors.push(ValidationError {
                field: "schema.body_property".into(),
                message: "must not be empty".into(),
            });
        }
        if matches!(&self.schema.date_property, Some(name) if name.trim().is_empty()) {
            errors.push(ValidationError {
                field: "schema.date_property".into(),
                message: "must not be empty when set".into(),
            });
        }

        // --- endpoints ---
        for (field, url) in [
            ("calendar.base_url", &self.calendar.base_url),
            ("records.base_url", &self.records.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be an http(s) URL, got {url:?}"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level {:?}; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- telemetry ---
        if self.telemetry.metrics_enabled
            && self
                .telemetry
                .metrics_endpoint
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            errors.push(ValidationError {
                field: "telemetry.metrics_endpoint".into(),
                message: format!(
                    "not a socket address: {:?}",
                    self.telemetry.metrics_endpoint
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder pre-populated with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn poll_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval_secs = seconds;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.debounce_ms = ms;
        self
    }

    pub fn lookahead_days(mut self, days: i64) -> Self {
        self.config.sync.lookahead_days = days;
        self
    }

    pub fn backfill_since(mut self, at: DateTime<Utc>) -> Self {
        self.config.sync.backfill_since = at;
        self
    }

    pub fn interval_policy(mut self, policy: IntervalPolicy) -> Self {
        self.config.sync.interval_policy = policy;
        self
    }

    pub fn adaptive_max_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.adaptive_max_interval_secs = seconds;
        self
    }

    // --- backoff ---

    pub fn backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.config.backoff.base_ms = base_ms;
        self.config.backoff.max_ms = max_ms;
        self
    }

    // --- schema ---

    pub fn date_property(mut self, name: impl Into<String>) -> Self {
        self.config.schema.date_property = Some(name.into());
        self
    }

    pub fn body_property(mut self, name: impl Into<String>) -> Self {
        self.config.schema.body_property = name.into();
        self
    }

    // --- endpoints ---

    pub fn calendar_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.calendar.base_url = url.into();
        self
    }

    pub fn records_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.records.base_url = url.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- state ---

    pub fn state_database(mut self, path: PathBuf) -> Self {
        self.config.state.database = path;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

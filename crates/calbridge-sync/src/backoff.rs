//! Retry delay after failed batches
//!
//! Backoff schedule with the defaults: 1s, 2s, 4s, ... capped at 60s. A
//! successful batch resets the delay to its base and lifts any hold.

use std::time::Duration;

use tokio::time::Instant;

use calbridge_core::config::BackoffConfig;

/// Tracks the current retry delay and when the next batch may start
#[derive(Debug, Clone)]
pub struct BackoffController {
    base: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
    hold_until: Option<Instant>,
}

impl BackoffController {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
            consecutive_failures: 0,
            hold_until: None,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_ms),
            Duration::from_millis(config.max_ms),
        )
    }

    /// True if a batch may start at `now`
    pub fn ready(&self, now: Instant) -> bool {
        self.hold_until.map_or(true, |until| now >= until)
    }

    /// Instant before which no batch may start, if held
    pub fn hold_until(&self) -> Option<Instant> {
        self.hold_until
    }

    /// Holds the next batch for the current delay, then doubles it
    ///
    /// Returns the delay applied.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.current;
        self.hold_until = Some(Instant::now() + delay);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn on_success(&mut self) {
        self.current = self.base;
        self.consecutive_failures = 0;
        self.hold_until = None;
    }

    /// Delay the next failure will apply
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

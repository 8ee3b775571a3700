//! Pair scheduler - decides how long to wait between full polls
//!
//! Under the default [`IntervalPolicy::Fixed`] every tick is
//! `poll_interval` apart, whatever happens. [`IntervalPolicy::Adaptive`]
//! doubles the wait after each idle pass while the window is unfocused,
//! up to `max_interval`, and snaps back as soon as the window gains focus,
//! a pass finds changes, or a local edit arrives.

use std::time::Duration;

use tracing::debug;

use calbridge_core::config::{IntervalPolicy, SyncConfig};

/// Poll interval policy plus the focus/activity signals it reads
#[derive(Debug, Clone)]
pub struct PairScheduler {
    policy: IntervalPolicy,
    base: Duration,
    max: Duration,
    focused: bool,
    idle_passes: u32,
}

impl PairScheduler {
    pub fn new(policy: IntervalPolicy, base: Duration, max: Duration) -> Self {
        Self {
            policy,
            base,
            max: max.max(base),
            focused: true,
            idle_passes: 0,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.interval_policy,
            Duration::from_secs(config.poll_interval_secs),
            Duration::from_secs(config.adaptive_max_interval_secs),
        )
    }

    /// Delay until the next scheduled full poll
    pub fn next_interval(&self) -> Duration {
        match self.policy {
            IntervalPolicy::Fixed => self.base,
            IntervalPolicy::Adaptive if self.focused => self.base,
            IntervalPolicy::Adaptive => {
                let factor = 1u32.checked_shl(self.idle_passes.min(16)).unwrap_or(u32::MAX);
                self.base.saturating_mul(factor).min(self.max)
            }
        }
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        if focused {
            self.idle_passes = 0;
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Feeds back whether the last batch wrote anything
    pub fn record_pass(&mut self, had_changes: bool) {
        if had_changes {
            self.idle_passes = 0;
        } else {
            self.idle_passes = self.idle_passes.saturating_add(1);
        }
        debug!(
            had_changes,
            idle_passes = self.idle_passes,
            next_ms = self.next_interval().as_millis() as u64,
            "Scheduler updated"
        );
    }

    /// A local edit counts as activity
    pub fn note_local_activity(&mut self) {
        self.idle_passes = 0;
    }
}

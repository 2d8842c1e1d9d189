use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Wait after the first failure of a burst.
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Quiet period after which the failure count starts over.
    #[serde(default = "default_reset_after", with = "humantime_serde")]
    pub reset_after: Duration,
}

fn default_base_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_reset_after() -> Duration {
    Duration::from_secs(900)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            reset_after: default_reset_after(),
        }
    }
}

/// Transient-failure bookkeeping for the collector's retry loop.
///
/// Each failure waits `base_delay * 2^n` (capped at `max_delay`), where `n`
/// counts the failures since the last quiet period longer than `reset_after`.
#[derive(Debug)]
pub struct ErrorBudget {
    config: RetryConfig,
    last_failure: Option<Instant>,
    consecutive_failures: u32,
}

impl ErrorBudget {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            last_failure: None,
            consecutive_failures: 0,
        }
    }

    /// Record a failure at `now` and return how long to wait before retrying.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        if let Some(last) = self.last_failure {
            if now.saturating_duration_since(last) > self.config.reset_after {
                self.consecutive_failures = 0;
            }
        }

        let wait = self.delay_for(self.consecutive_failures);
        self.last_failure = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        wait
    }

    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .checked_mul(factor)
            .map_or(self.config.max_delay, |d| d.min(self.config.max_delay))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: f64) -> Duration {
        Duration::from_secs_f64(value)
    }

    #[test]
    fn test_waits_double_until_capped() {
        let mut budget = ErrorBudget::new(RetryConfig::default());
        let start = Instant::now();

        let waits: Vec<Duration> = (0..12)
            .map(|i| budget.record_failure(start + Duration::from_secs(i)))
            .collect();

        assert_eq!(
            &waits[..8],
            &[
                secs(0.25),
                secs(0.5),
                secs(1.0),
                secs(2.0),
                secs(4.0),
                secs(8.0),
                secs(16.0),
                secs(30.0)
            ]
        );
        assert!(waits[8..].iter().all(|w| *w == secs(30.0)));
        assert!(waits.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(budget.consecutive_failures(), 12);
    }

    #[test]
    fn test_quiet_period_resets_wait() {
        let mut budget = ErrorBudget::new(RetryConfig::default());
        let start = Instant::now();

        budget.record_failure(start);
        budget.record_failure(start + Duration::from_secs(1));
        budget.record_failure(start + Duration::from_secs(2));

        let wait = budget.record_failure(start + Duration::from_secs(2 + 901));
        assert_eq!(wait, secs(0.25));
        assert_eq!(budget.consecutive_failures(), 1);
    }

    #[test]
    fn test_failures_within_window_keep_growing() {
        let mut budget = ErrorBudget::new(RetryConfig::default());
        let start = Instant::now();

        budget.record_failure(start);
        let wait = budget.record_failure(start + Duration::from_secs(899));
        assert_eq!(wait, secs(0.5));
    }

    #[test]
    fn test_huge_failure_count_saturates_at_cap() {
        let budget = ErrorBudget::new(RetryConfig::default());
        assert_eq!(budget.delay_for(64), secs(30.0));
        assert_eq!(budget.delay_for(u32::MAX), secs(30.0));
    }
}

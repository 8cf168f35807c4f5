//! Exponential backoff for delivery retries.

use std::time::Duration;

use rand::Rng;

/// Backoff shape: exponential growth from an initial delay up to a cap.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the computed delay (before jitter).
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Tracks consecutive failures and yields the delay before the next attempt.
///
/// The delay grows exponentially per failure and collapses back to zero on
/// the first success, so a recovered collector is served at full rate
/// immediately.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Record a successful attempt, resetting the delay.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// The delay to wait before the next attempt. Zero when nothing has
    /// failed since the last success.
    pub fn delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = (self.consecutive_failures - 1).min(31);
        let base = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(exponent as i32);
        let capped = base.min(self.config.max_delay.as_secs_f64());

        let final_delay = if self.config.jitter {
            // Up to 25% jitter so restarted clients do not retry in lockstep.
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped * jitter_factor
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff_without_jitter() -> Backoff {
        Backoff::new(BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: false,
        })
    }

    #[test]
    fn test_no_delay_before_first_failure() {
        let backoff = backoff_without_jitter();
        assert_eq!(backoff.delay(), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let mut backoff = backoff_without_jitter();

        backoff.record_failure();
        assert_eq!(backoff.delay(), Duration::from_millis(100));
        backoff.record_failure();
        assert_eq!(backoff.delay(), Duration::from_millis(200));
        backoff.record_failure();
        assert_eq!(backoff.delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let mut backoff = backoff_without_jitter();
        for _ in 0..20 {
            backoff.record_failure();
        }
        assert_eq!(backoff.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_success_resets() {
        let mut backoff = backoff_without_jitter();
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        assert_eq!(backoff.delay(), Duration::ZERO);
        // After a reset, backoff starts over from the initial delay.
        backoff.record_failure();
        assert_eq!(backoff.delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        });
        backoff.record_failure();

        for _ in 0..100 {
            let delay = backoff.delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }
}

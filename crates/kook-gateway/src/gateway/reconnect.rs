//! Reconnection configuration and exponential backoff.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Consecutive failed attempts before giving up.
    pub max_consecutive_failures: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_consecutive_failures: 5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for the given attempt number (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1).min(64) as i32);
        let delay_millis = self.initial_delay.as_millis() as f64 * multiplier;
        if delay_millis >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_millis as u64).min(self.max_delay)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    #[must_use]
    pub const fn should_reconnect(&self, failures: u32) -> bool {
        failures < self.max_consecutive_failures
    }
}

/// Backoff state owned by the supervisor.
///
/// The delay grows from `initial_delay` by the multiplier on every failure,
/// never exceeds `max_delay`, and drops back to `initial_delay` on reset.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    /// Start at the initial delay.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay the next failure will wait.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.config.delay_for_attempt(self.attempt + 1)
    }

    /// Return the delay for this failure and grow the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current();
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.max_consecutive_failures, 5);
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = ReconnectConfig::default();

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(16));
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(32));
        assert_eq!(config.delay_for_attempt(7), Duration::from_secs(60)); // capped
    }

    #[test]
    fn test_delay_with_zero_attempt() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
    }

    #[test]
    fn test_delay_saturates_for_huge_attempts() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_should_reconnect_ceiling() {
        let config = ReconnectConfig::default();
        assert!(config.should_reconnect(0));
        assert!(config.should_reconnect(4));
        assert!(!config.should_reconnect(5));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            ..ReconnectConfig::default()
        });

        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_secs(4));

        backoff.reset();

        assert_eq!(backoff.current(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn backoff_stays_within_bounds(
                initial in 1u64..5_000,
                extra in 0u64..120_000,
                steps in 0usize..80,
            ) {
                let config = ReconnectConfig {
                    initial_delay: Duration::from_millis(initial),
                    max_delay: Duration::from_millis(initial + extra),
                    ..ReconnectConfig::default()
                };
                let mut backoff = Backoff::new(config.clone());
                let mut previous = Duration::ZERO;
                for _ in 0..steps {
                    let delay = backoff.next_delay();
                    prop_assert!(delay >= config.initial_delay);
                    prop_assert!(delay <= config.max_delay);
                    prop_assert!(delay >= previous);
                    previous = delay;
                }
            }
        }
    }
}

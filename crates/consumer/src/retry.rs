//! Exponential backoff schedule.

use std::time::Duration;

use crate::RetryConfigError;

/// How often and how fast a failed handler is retried.
///
/// `delay(n)` is the wait before attempt `n + 1`, where attempt 0 is the
/// original try: `min(max_backoff, initial_backoff * backoff_factor^n)`.
/// A message gets `max_retries + 1` attempts in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    backoff_factor: f64,
}

impl RetryPolicy {
    /// Creates a policy, rejecting a factor below 1 or an initial delay
    /// longer than the cap.
    pub fn new(
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_factor: f64,
    ) -> Result<Self, RetryConfigError> {
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(RetryConfigError::InvalidFactor(backoff_factor));
        }
        if initial_backoff > max_backoff {
            return Err(RetryConfigError::InitialExceedsMax {
                initial: initial_backoff,
                max: max_backoff,
            });
        }
        Ok(Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_factor,
        })
    }

    /// A policy that never retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts, counting the original one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns true if another attempt follows a failed attempt `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Returns the wait before attempt `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..7).map(|n| policy.delay(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn delay_is_non_decreasing_and_bounded() {
        let policy =
            RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(3), 1.7).unwrap();
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous, "delay({attempt}) went down");
            assert!(delay <= Duration::from_secs(3));
            previous = delay;
        }
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(3));
    }

    #[test]
    fn factor_of_one_gives_a_constant_schedule() {
        let policy =
            RetryPolicy::new(5, Duration::from_millis(250), Duration::from_secs(1), 1.0).unwrap();
        assert!((0..5).all(|n| policy.delay(n) == Duration::from_millis(250)));
    }

    #[test]
    fn retries_stop_after_max_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retries().should_retry(0));
    }

    #[test]
    fn malformed_configs_fail_at_construction() {
        let second = Duration::from_secs(1);
        assert_eq!(
            RetryPolicy::new(3, second, second, 0.5),
            Err(RetryConfigError::InvalidFactor(0.5))
        );
        assert!(matches!(
            RetryPolicy::new(3, second, second, f64::NAN),
            Err(RetryConfigError::InvalidFactor(_))
        ));
        assert_eq!(
            RetryPolicy::new(3, second * 2, second, 2.0),
            Err(RetryConfigError::InitialExceedsMax {
                initial: second * 2,
                max: second
            })
        );
    }
}

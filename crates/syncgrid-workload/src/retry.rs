//! Retry policy for workload service calls.
//!
//! An explicit policy object passed to the client constructor: bounded
//! attempt count, exponential backoff with a cap, and a jitter fraction
//! spread on top of each delay.

use std::time::Duration;

use rand::Rng;

/// Retry policy: attempts, backoff curve, jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first call included. Minimum 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for the backoff curve.
    pub max_delay: Duration,
    /// Fraction (0.0–1.0) of the delay added as random jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-based), without jitter.
    ///
    /// Doubles from `base_delay` and caps at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// Backoff delay before retry number `attempt`, with jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = rand::rng().random_range(0.0..=self.jitter);
        delay + delay.mul_f64(spread)
    }

    /// Attempt count, clamped to at least one call.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
        }
    }

    #[test]
    fn delays_double_from_base() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn delays_cap_at_max() {
        let p = policy();
        assert_eq!(p.delay_for(5), Duration::from_secs(1));
        assert_eq!(p.delay_for(20), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = RetryPolicy {
            jitter: 0.5,
            ..policy()
        };
        for _ in 0..100 {
            let d = p.jittered_delay(2);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(300));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let p = policy();
        assert_eq!(p.jittered_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn attempts_clamped_to_one() {
        let p = RetryPolicy {
            max_attempts: 0,
            ..policy()
        };
        assert_eq!(p.attempts(), 1);
    }
}

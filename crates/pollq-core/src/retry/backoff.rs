//! Delay strategies: fixed interval and exponential backoff.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::{RetryPolicy, add_delay};
use crate::domain::ConsumerError;

/// Retry after the same delay every time.
#[derive(Debug, Clone)]
pub struct FixedDelayRetryPolicy {
    delay: Duration,
}

impl FixedDelayRetryPolicy {
    pub fn new(delay: Duration) -> Result<Self, ConsumerError> {
        if delay.is_zero() {
            return Err(ConsumerError::invalid("retry delay must be positive"));
        }
        check_representable("retry delay", delay)?;
        Ok(Self { delay })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl RetryPolicy for FixedDelayRetryPolicy {
    fn next_attempt_time(&self, last_attempt_time: DateTime<Utc>, _: u32) -> Option<DateTime<Utc>> {
        add_delay(last_attempt_time, self.delay)
    }
}

/// Exponential backoff: `base_delay * multiplier^(attempt_count - 1)`, capped
/// at `max_delay`.
///
/// Example with base_delay=2s, multiplier=2.0:
/// - attempt 1 (first failure): 2s
/// - attempt 2: 4s
/// - attempt 3: 8s
#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetryPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl ExponentialBackoffRetryPolicy {
    pub fn new(
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self, ConsumerError> {
        if base_delay.is_zero() {
            return Err(ConsumerError::invalid("base retry delay must be positive"));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConsumerError::invalid(format!(
                "backoff multiplier must be a finite number >= 1.0, but is {multiplier}"
            )));
        }
        if max_delay < base_delay {
            return Err(ConsumerError::invalid(format!(
                "max retry delay {max_delay:?} is shorter than base delay {base_delay:?}"
            )));
        }
        // delay_for() never exceeds max_delay
        check_representable("max retry delay", max_delay)?;
        Ok(Self {
            base_delay,
            multiplier,
            max_delay,
        })
    }

    /// 2s base, 2.0 multiplier, at most one hour.
    pub fn default_v1() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60 * 60),
        }
    }

    /// Delay after the `attempt_count`-th attempt. Attempt 0 uses the base delay.
    pub fn delay_for(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

impl RetryPolicy for ExponentialBackoffRetryPolicy {
    fn next_attempt_time(
        &self,
        last_attempt_time: DateTime<Utc>,
        attempt_count: u32,
    ) -> Option<DateTime<Utc>> {
        add_delay(last_attempt_time, self.delay_for(attempt_count))
    }
}

/// Rejects delays that do not fit in a `TimeDelta`.
fn check_representable(what: &str, delay: Duration) -> Result<(), ConsumerError> {
    TimeDelta::from_std(delay)
        .map(|_| ())
        .map_err(|_| ConsumerError::invalid(format!("{what} {delay:?} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use rstest::rstest;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = ExponentialBackoffRetryPolicy::default_v1();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = ExponentialBackoffRetryPolicy::default_v1();

        let d1 = policy.delay_for(1);
        let d2 = policy.delay_for(2);
        let d3 = policy.delay_for(3);

        assert!(d2 > d1);
        assert!(d3 > d2);
        assert_eq!(d3, Duration::from_secs(8));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ExponentialBackoffRetryPolicy::new(
            Duration::from_secs(1),
            10.0,
            Duration::from_secs(100),
        )
        .unwrap();

        assert_eq!(policy.delay_for(3), Duration::from_secs(100));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(100));
    }

    #[test]
    fn next_attempt_time_is_relative_to_last_attempt() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let policy = ExponentialBackoffRetryPolicy::default_v1();
        assert_eq!(policy.next_attempt_time(t, 2), Some(t + TimeDelta::seconds(4)));

        let fixed = FixedDelayRetryPolicy::new(Duration::from_secs(60)).unwrap();
        assert_eq!(fixed.next_attempt_time(t, 7), Some(t + TimeDelta::seconds(60)));
    }

    #[rstest]
    #[case::zero_base(Duration::ZERO, 2.0, Duration::from_secs(10))]
    #[case::shrinking(Duration::from_secs(1), 0.5, Duration::from_secs(10))]
    #[case::nan(Duration::from_secs(1), f64::NAN, Duration::from_secs(10))]
    #[case::max_below_base(Duration::from_secs(10), 2.0, Duration::from_secs(1))]
    #[case::max_out_of_range(Duration::from_secs(1), 2.0, Duration::from_secs(u64::MAX))]
    fn invalid_backoff_is_rejected(
        #[case] base: Duration,
        #[case] multiplier: f64,
        #[case] max: Duration,
    ) {
        let result = ExponentialBackoffRetryPolicy::new(base, multiplier, max);
        assert!(matches!(result, Err(ConsumerError::InvalidConfiguration(_))));
    }

    #[test]
    fn zero_fixed_delay_is_rejected() {
        assert!(FixedDelayRetryPolicy::new(Duration::ZERO).is_err());
    }

    #[test]
    fn out_of_range_fixed_delay_is_rejected() {
        let result = FixedDelayRetryPolicy::new(Duration::from_secs(u64::MAX));
        assert!(matches!(
            result,
            Err(ConsumerError::InvalidConfiguration(msg)) if msg.contains("out of range")
        ));
    }
}

//! Retry policies: decide when a failed item is attempted again.
//!
//! A policy is a pure function of `(last_attempt_time, attempt_count)`.
//! Policies hold configuration only, never per-item state, so they can be
//! shared between consumers and stacked as decorators:
//!
//! ```ignore
//! let policy = LimitedRetryPolicy::new(5, ExponentialBackoffRetryPolicy::default_v1())?;
//! ```

mod backoff;
mod limited;

pub use backoff::{ExponentialBackoffRetryPolicy, FixedDelayRetryPolicy};
pub use limited::LimitedRetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Retry policy for failed items.
pub trait RetryPolicy: Send + Sync {
    /// Calculate the next attempt time.
    ///
    /// # Arguments
    /// * `last_attempt_time` - When the failed attempt happened.
    /// * `attempt_count` - Attempts made so far, including the failed one.
    ///
    /// # Returns
    /// `Some(time)` to schedule another attempt, `None` to give up.
    fn next_attempt_time(
        &self,
        last_attempt_time: DateTime<Utc>,
        attempt_count: u32,
    ) -> Option<DateTime<Utc>>;
}

impl<P: RetryPolicy + ?Sized> RetryPolicy for Arc<P> {
    fn next_attempt_time(
        &self,
        last_attempt_time: DateTime<Utc>,
        attempt_count: u32,
    ) -> Option<DateTime<Utc>> {
        (**self).next_attempt_time(last_attempt_time, attempt_count)
    }
}

impl<P: RetryPolicy + ?Sized> RetryPolicy for Box<P> {
    fn next_attempt_time(
        &self,
        last_attempt_time: DateTime<Utc>,
        attempt_count: u32,
    ) -> Option<DateTime<Utc>> {
        (**self).next_attempt_time(last_attempt_time, attempt_count)
    }
}

/// Never retries. Useful as the innermost policy of "try exactly once" setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn next_attempt_time(&self, _: DateTime<Utc>, _: u32) -> Option<DateTime<Utc>> {
        None
    }
}

/// `time + delay`, or `None` if the result is not representable.
pub(crate) fn add_delay(time: DateTime<Utc>, delay: Duration) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::from_std(delay).ok()?;
    time.checked_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn shared_policies_delegate() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fixed = FixedDelayRetryPolicy::new(Duration::from_secs(30)).unwrap();

        let shared: Arc<dyn RetryPolicy> = Arc::new(fixed.clone());
        let boxed: Box<dyn RetryPolicy> = Box::new(fixed);

        let expected = Some(t + TimeDelta::seconds(30));
        assert_eq!(shared.next_attempt_time(t, 1), expected);
        assert_eq!(boxed.next_attempt_time(t, 1), expected);
    }

    #[test]
    fn no_retry_policy_always_gives_up() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(NoRetryPolicy.next_attempt_time(t, 0), None);
        assert_eq!(NoRetryPolicy.next_attempt_time(t, 10), None);
    }

    #[test]
    fn add_delay_overflow_is_none() {
        assert_eq!(add_delay(DateTime::<Utc>::MAX_UTC, Duration::from_secs(1)), None);
    }
}

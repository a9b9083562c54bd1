//! Attempt ceiling decorator.

use chrono::{DateTime, Utc};

use super::RetryPolicy;
use crate::domain::ConsumerError;

/// Caps the total number of attempts of an item.
///
/// - `attempt_count < attempt_count_limit`: the delegate decides.
/// - otherwise: give up, the delegate is not consulted.
#[derive(Debug, Clone)]
pub struct LimitedRetryPolicy<P> {
    attempt_count_limit: u32,
    delegate: P,
}

impl<P: RetryPolicy> LimitedRetryPolicy<P> {
    pub fn new(attempt_count_limit: u32, delegate: P) -> Result<Self, ConsumerError> {
        if attempt_count_limit < 1 {
            return Err(ConsumerError::invalid(format!(
                "attempt count limit cannot be less than 1, but is {attempt_count_limit}"
            )));
        }
        Ok(Self {
            attempt_count_limit,
            delegate,
        })
    }

    pub fn attempt_count_limit(&self) -> u32 {
        self.attempt_count_limit
    }

    pub fn delegate(&self) -> &P {
        &self.delegate
    }
}

impl<P: RetryPolicy> RetryPolicy for LimitedRetryPolicy<P> {
    fn next_attempt_time(
        &self,
        last_attempt_time: DateTime<Utc>,
        attempt_count: u32,
    ) -> Option<DateTime<Utc>> {
        if attempt_count < self.attempt_count_limit {
            self.delegate
                .next_attempt_time(last_attempt_time, attempt_count)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    /// "Always retry in 60s" and counts how often it is asked.
    #[derive(Default)]
    struct CountingPolicy {
        calls: AtomicU32,
    }

    impl RetryPolicy for CountingPolicy {
        fn next_attempt_time(&self, last: DateTime<Utc>, _: u32) -> Option<DateTime<Utc>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(last + TimeDelta::seconds(60))
        }
    }

    #[test]
    fn zero_limit_is_rejected() {
        let result = LimitedRetryPolicy::new(0, CountingPolicy::default());
        assert!(matches!(
            result,
            Err(ConsumerError::InvalidConfiguration(msg)) if msg.contains("less than 1")
        ));
    }

    #[rstest]
    #[case(1, 0)]
    #[case(3, 0)]
    #[case(3, 2)]
    #[case(10, 9)]
    fn below_limit_returns_delegate_result(#[case] limit: u32, #[case] attempt_count: u32) {
        let policy = LimitedRetryPolicy::new(limit, CountingPolicy::default()).unwrap();

        let next = policy.next_attempt_time(t0(), attempt_count);

        assert_eq!(next, Some(t0() + TimeDelta::seconds(60)));
        assert_eq!(policy.delegate().calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(3, 3)]
    #[case(3, 4)]
    #[case(10, u32::MAX)]
    fn at_or_above_limit_gives_up_without_asking_delegate(
        #[case] limit: u32,
        #[case] attempt_count: u32,
    ) {
        let policy = LimitedRetryPolicy::new(limit, CountingPolicy::default()).unwrap();

        assert_eq!(policy.next_attempt_time(t0(), attempt_count), None);
        assert_eq!(policy.delegate().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn delegate_giving_up_is_passed_through() {
        let policy = LimitedRetryPolicy::new(5, crate::retry::NoRetryPolicy).unwrap();
        assert_eq!(policy.next_attempt_time(t0(), 1), None);
    }

    #[test]
    fn decorators_stack() {
        let inner = LimitedRetryPolicy::new(5, CountingPolicy::default()).unwrap();
        let outer = LimitedRetryPolicy::new(2, inner).unwrap();

        assert!(outer.next_attempt_time(t0(), 1).is_some());
        assert_eq!(outer.next_attempt_time(t0(), 2), None);
        assert_eq!(outer.attempt_count_limit(), 2);
    }
}

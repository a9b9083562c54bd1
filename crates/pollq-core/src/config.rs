//! Consumer configuration.
//!
//! Loaded from JSON (`from_json_str`) or from `POLLQ_*` environment variables
//! (`from_env`). Values are checked by `validate()`; the builder re-checks
//! limits when the consumer is built.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConsumerError;
use crate::retry::{
    ExponentialBackoffRetryPolicy, FixedDelayRetryPolicy, LimitedRetryPolicy, RetryPolicy,
};

/// Delay strategy of the retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryConfig {
    Fixed {
        delay_secs: u64,
    },
    Exponential {
        base_delay_secs: u64,
        multiplier: f64,
        max_delay_secs: u64,
    },
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::Exponential {
            base_delay_secs: 2,
            multiplier: 2.0,
            max_delay_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsumerConfig {
    /// Items fetched per cycle.
    pub polled_items_limit: usize,

    /// Delay between the end of one cycle and the start of the next.
    pub polling_period_secs: u64,

    pub retry: RetryConfig,

    /// Total attempts per item. `None` retries for as long as the delay
    /// strategy does.
    pub attempt_count_limit: Option<u32>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            polled_items_limit: 10,
            polling_period_secs: 5,
            retry: RetryConfig::default(),
            attempt_count_limit: Some(5),
        }
    }
}

impl ConsumerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConsumerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConsumerError::invalid(format!("malformed consumer config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables:
    /// - `POLLQ_POLLED_ITEMS_LIMIT`
    /// - `POLLQ_POLLING_PERIOD_SECS`
    /// - `POLLQ_ATTEMPT_COUNT_LIMIT` (`none` disables the limit)
    /// - `POLLQ_RETRY_DELAY_SECS` (switches to a fixed delay)
    pub fn from_env() -> Result<Self, ConsumerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConsumerError> {
        let mut config = Self::default();

        if let Some(v) = lookup("POLLQ_POLLED_ITEMS_LIMIT") {
            config.polled_items_limit = parse_var("POLLQ_POLLED_ITEMS_LIMIT", &v)?;
        }
        if let Some(v) = lookup("POLLQ_POLLING_PERIOD_SECS") {
            config.polling_period_secs = parse_var("POLLQ_POLLING_PERIOD_SECS", &v)?;
        }
        if let Some(v) = lookup("POLLQ_ATTEMPT_COUNT_LIMIT") {
            config.attempt_count_limit = match v.trim() {
                "none" => None,
                other => Some(parse_var("POLLQ_ATTEMPT_COUNT_LIMIT", other)?),
            };
        }
        if let Some(v) = lookup("POLLQ_RETRY_DELAY_SECS") {
            config.retry = RetryConfig::Fixed {
                delay_secs: parse_var("POLLQ_RETRY_DELAY_SECS", &v)?,
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn polling_period(&self) -> Duration {
        Duration::from_secs(self.polling_period_secs)
    }

    pub fn validate(&self) -> Result<(), ConsumerError> {
        if self.polled_items_limit < 1 {
            return Err(ConsumerError::invalid(format!(
                "polled items limit cannot be less than 1, but is {}",
                self.polled_items_limit
            )));
        }
        if self.polling_period_secs < 1 {
            return Err(ConsumerError::invalid(format!(
                "polling period cannot be less than 1 sec, but is {}",
                self.polling_period_secs
            )));
        }
        self.build_retry_policy().map(|_| ())
    }

    /// Delay strategy, wrapped in [`LimitedRetryPolicy`] when an attempt
    /// limit is configured.
    pub fn build_retry_policy(&self) -> Result<Arc<dyn RetryPolicy>, ConsumerError> {
        let strategy: Arc<dyn RetryPolicy> = match &self.retry {
            RetryConfig::Fixed { delay_secs } => Arc::new(FixedDelayRetryPolicy::new(
                Duration::from_secs(*delay_secs),
            )?),
            RetryConfig::Exponential {
                base_delay_secs,
                multiplier,
                max_delay_secs,
            } => Arc::new(ExponentialBackoffRetryPolicy::new(
                Duration::from_secs(*base_delay_secs),
                *multiplier,
                Duration::from_secs(*max_delay_secs),
            )?),
        };

        match self.attempt_count_limit {
            Some(limit) => Ok(Arc::new(LimitedRetryPolicy::new(limit, strategy)?)),
            None => Ok(strategy),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConsumerError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConsumerError::invalid(format!("{key}={value:?}: {e}")))
}

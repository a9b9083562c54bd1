//! QueueConsumerBuilder - wiring and startup validation.
//!
//! # Fail-fast 設計
//! - build() で全ての制約をチェックし、違反があれば InvalidConfiguration を返す
//! - 起動後に設定ミスが発覚することはない

use std::sync::Arc;
use std::time::Duration;

use super::consumer::{Pipeline, QueueConsumer};
use crate::config::ConsumerConfig;
use crate::domain::ConsumerError;
use crate::ports::{Clock, ConsumerModule, SystemClock, TransactionManager};
use crate::retry::RetryPolicy;

/// Builds a [`QueueConsumer`].
///
/// # 使用例
/// ```ignore
/// let consumer = QueueConsumerBuilder::new()
///     .module(my_module)
///     .transactions(my_tx_manager)
///     .retry_policy(LimitedRetryPolicy::new(5, ExponentialBackoffRetryPolicy::default_v1())?)
///     .polled_items_limit(50)
///     .polling_period(Duration::from_secs(5))
///     .build()?;
/// ```
pub struct QueueConsumerBuilder<M, T> {
    module: Option<Arc<M>>,
    transactions: Option<Arc<T>>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    clock: Arc<dyn Clock>,
    polled_items_limit: usize,
    polling_period: Duration,
}

impl<M, T> QueueConsumerBuilder<M, T>
where
    M: ConsumerModule<Transaction = T::Transaction> + 'static,
    T: TransactionManager + 'static,
{
    pub const DEFAULT_POLLED_ITEMS_LIMIT: usize = 10;
    pub const DEFAULT_POLLING_PERIOD: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self {
            module: None,
            transactions: None,
            retry_policy: None,
            clock: Arc::new(SystemClock),
            polled_items_limit: Self::DEFAULT_POLLED_ITEMS_LIMIT,
            polling_period: Self::DEFAULT_POLLING_PERIOD,
        }
    }

    pub fn module(self, module: M) -> Self {
        self.shared_module(Arc::new(module))
    }

    /// Use a module that is also referenced elsewhere.
    pub fn shared_module(mut self, module: Arc<M>) -> Self {
        self.module = Some(module);
        self
    }

    pub fn transactions(mut self, transactions: T) -> Self {
        self.transactions = Some(Arc::new(transactions));
        self
    }

    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Some(Arc::new(policy));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn polled_items_limit(mut self, limit: usize) -> Self {
        self.polled_items_limit = limit;
        self
    }

    pub fn polling_period(mut self, period: Duration) -> Self {
        self.polling_period = period;
        self
    }

    /// Apply limits, period and retry policy from a [`ConsumerConfig`].
    pub fn config(self, config: &ConsumerConfig) -> Result<Self, ConsumerError> {
        let policy = config.build_retry_policy()?;
        Ok(self
            .polled_items_limit(config.polled_items_limit)
            .polling_period(config.polling_period())
            .retry_policy(policy))
    }

    pub fn build(self) -> Result<QueueConsumer<M, T>, ConsumerError> {
        if self.polled_items_limit < 1 {
            return Err(ConsumerError::invalid(format!(
                "polled items limit cannot be less than 1, but is {}",
                self.polled_items_limit
            )));
        }
        if self.polling_period < Duration::from_millis(1) {
            return Err(ConsumerError::invalid(format!(
                "polling period cannot be less than 1ms, but is {:?}",
                self.polling_period
            )));
        }
        let module = self
            .module
            .ok_or_else(|| ConsumerError::invalid("consumer module is required"))?;
        let transactions = self
            .transactions
            .ok_or_else(|| ConsumerError::invalid("transaction manager is required"))?;
        let retry_policy = self
            .retry_policy
            .ok_or_else(|| ConsumerError::invalid("retry policy is required"))?;

        Ok(QueueConsumer::from_pipeline(Pipeline {
            module,
            transactions,
            retry_policy,
            clock: self.clock,
            polled_items_limit: self.polled_items_limit,
            polling_period: self.polling_period,
        }))
    }
}

impl<M, T> Default for QueueConsumerBuilder<M, T>
where
    M: ConsumerModule<Transaction = T::Transaction> + 'static,
    T: TransactionManager + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

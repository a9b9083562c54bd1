//! QueueConsumer - polling loop and per-item pipeline.
//!
//! # フロー
//! 1. Clock から now を取得し、ConsumerModule::find_due_item_ids() で due な id を取得
//! 2. id ごとにトランザクション A を開き process_item → success を記録 → commit
//! 3. A が何らかの理由で失敗したら A を破棄し、独立したトランザクション B で
//!    failure を記録して RetryPolicy に次回時刻を問い合わせる
//!
//! One item's failure never stops the rest of the batch, and nothing a
//! collaborator does terminates the polling task. A panic while processing an
//! item is recorded as a failed attempt of that item.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{BoxError, ConsumerError, CycleReport, ItemOutcome};
use crate::ports::{Clock, ConsumerModule, Transaction, TransactionManager};
use crate::retry::RetryPolicy;

/// Polls a [`ConsumerModule`] on a fixed delay and processes due items.
///
/// Built with [`QueueConsumerBuilder`](super::QueueConsumerBuilder).
///
/// Lifecycle: `Stopped -> Running -> Stopped`. `start` on a running consumer
/// and `stop` on a stopped one are no-ops. Dropping a running consumer aborts
/// its polling task, including a cycle in flight; its open transaction is
/// dropped without commit.
pub struct QueueConsumer<M, T> {
    pipeline: Arc<Pipeline<M, T>>,
    task: Option<PollingTask>,
}

struct PollingTask {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Everything one cycle needs. Shared between the consumer handle and its
/// polling task.
pub(crate) struct Pipeline<M, T> {
    pub(crate) module: Arc<M>,
    pub(crate) transactions: Arc<T>,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) polled_items_limit: usize,
    pub(crate) polling_period: Duration,
}

impl<M, T> QueueConsumer<M, T>
where
    M: ConsumerModule<Transaction = T::Transaction> + 'static,
    T: TransactionManager + 'static,
{
    pub(crate) fn from_pipeline(pipeline: Pipeline<M, T>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            task: None,
        }
    }

    pub fn polled_items_limit(&self) -> usize {
        self.pipeline.polled_items_limit
    }

    pub fn polling_period(&self) -> Duration {
        self.pipeline.polling_period
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.join.is_finished())
    }

    /// Start the polling task: first cycle after one period, then one period
    /// after each cycle completes. Must be called within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("queue processing task is already running");
            return;
        }

        info!(
            polling_period = ?self.pipeline.polling_period,
            polled_items_limit = self.pipeline.polled_items_limit,
            "starting queue processing task"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pipeline = Arc::clone(&self.pipeline);
        let join = tokio::spawn(polling_loop(pipeline, shutdown_rx));
        self.task = Some(PollingTask { shutdown_tx, join });
    }

    /// Stop the polling task and wait for it to finish.
    ///
    /// A cycle that is already running completes first; no further cycle is
    /// started.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        info!("stopping queue processing task");
        // ignore send error: the task may already be gone
        let _ = task.shutdown_tx.send(true);
        if let Err(e) = task.join.await {
            error!(error = %e, "queue processing task ended abnormally");
        }
    }

    /// Run one polling cycle now.
    ///
    /// Returns `Err(ConsumerError::Fetch)` when due items could not be
    /// fetched; item failures are reported through the [`CycleReport`].
    pub async fn process_queued_items(&self) -> Result<CycleReport, ConsumerError> {
        self.pipeline.process_queued_items().await
    }
}

impl<M, T> Drop for QueueConsumer<M, T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.join.abort();
        }
    }
}

async fn polling_loop<M, T>(pipeline: Arc<Pipeline<M, T>>, mut shutdown_rx: watch::Receiver<bool>)
where
    M: ConsumerModule<Transaction = T::Transaction> + 'static,
    T: TransactionManager + 'static,
{
    loop {
        tokio::select! {
            // shutdown 要求、または consumer 側が drop された
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(pipeline.polling_period) => {}
        }
        if *shutdown_rx.borrow() {
            break;
        }

        // panic は item 単位で捕捉済み。ここでは fetch 側の panic を拾う
        let cycle = AssertUnwindSafe(pipeline.process_queued_items()).catch_unwind();
        match cycle.await {
            Ok(Ok(report)) if !report.is_empty() => {
                info!(
                    fetched = report.fetched,
                    succeeded = report.succeeded,
                    failed = report.failed(),
                    vanished = report.vanished,
                    "queue processing cycle finished"
                );
            }
            // empty cycle, or fetch failure (already logged)
            Ok(_) => {}
            Err(payload) => error!(
                panic = %panic_message(&*payload),
                "queue processing cycle panicked"
            ),
        }
    }
    debug!("queue processing task finished");
}

impl<M, T> Pipeline<M, T>
where
    M: ConsumerModule<Transaction = T::Transaction> + 'static,
    T: TransactionManager + 'static,
{
    pub(crate) async fn process_queued_items(&self) -> Result<CycleReport, ConsumerError> {
        let now = self.clock.now();
        let item_ids = match self
            .module
            .find_due_item_ids(now, self.polled_items_limit)
            .await
        {
            Ok(ids) => ids,
            Err(source) => {
                let err = ConsumerError::Fetch(source);
                error!(error = %err, "error while fetching queued items");
                return Err(err);
            }
        };

        let mut report = CycleReport {
            fetched: item_ids.len(),
            ..CycleReport::default()
        };
        if item_ids.is_empty() {
            return Ok(report);
        }

        let total = item_ids.len();
        info!(count = total, "fetched pending queued items");
        for (index, item_id) in item_ids.iter().enumerate() {
            let outcome = self
                .process_item_and_handle_error(item_id, index + 1, total)
                .await;
            report.record(&outcome);
        }
        Ok(report)
    }

    async fn process_item_and_handle_error(
        &self,
        item_id: &M::Id,
        current: usize,
        total: usize,
    ) -> ItemOutcome {
        let attempt = AssertUnwindSafe(self.process_item(item_id, current, total)).catch_unwind();
        let source = match attempt.await {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(source)) => source,
            // unwinding dropped transaction A
            Err(payload) => format!("panicked: {}", panic_message(&*payload)).into(),
        };

        let failure = ConsumerError::Processing {
            item: format!("{item_id:?}"),
            source,
        };
        error!(item_id = ?item_id, error = %failure, "error while processing item");

        let bookkeeping =
            AssertUnwindSafe(self.register_processing_failure(item_id, &failure)).catch_unwind();
        let result = match bookkeeping.await {
            Ok(result) => result,
            Err(payload) => Err(format!("panicked: {}", panic_message(&*payload)).into()),
        };
        match result {
            Ok(outcome) => outcome,
            Err(source) => {
                let err = ConsumerError::Bookkeeping {
                    item: format!("{item_id:?}"),
                    source,
                };
                // トランザクション B は破棄済み。item は処理前の state のまま残るので、
                // due であれば次のサイクルで再度拾われる
                error!(
                    item_id = ?item_id,
                    error = %err,
                    "failed attempt was not recorded; item keeps its previous queueing state"
                );
                ItemOutcome::BookkeepingFailed
            }
        }
    }

    /// Transaction A: domain work + success bookkeeping.
    async fn process_item(
        &self,
        item_id: &M::Id,
        current: usize,
        total: usize,
    ) -> Result<ItemOutcome, BoxError> {
        let mut tx = self.transactions.begin().await.map_err(transaction_error)?;
        let result = self.process_item_in(&mut tx, item_id, current, total).await;
        finish(tx, result).await
    }

    async fn process_item_in(
        &self,
        tx: &mut T::Transaction,
        item_id: &M::Id,
        current: usize,
        total: usize,
    ) -> Result<ItemOutcome, BoxError> {
        debug!(item_id = ?item_id, current, total, "processing queued item");
        let Some(mut state) = self.module.process_item(tx, item_id, current, total).await? else {
            warn!(item_id = ?item_id, "no queued item found to process");
            return Ok(ItemOutcome::Vanished);
        };

        state.register_attempt_success(self.clock.now());
        self.module.save_queueing_state(tx, item_id, &state).await?;
        Ok(ItemOutcome::Succeeded)
    }

    /// Transaction B: record the failed attempt and ask the retry policy.
    async fn register_processing_failure(
        &self,
        item_id: &M::Id,
        failure: &ConsumerError,
    ) -> Result<ItemOutcome, BoxError> {
        let mut tx = self.transactions.begin().await.map_err(transaction_error)?;
        let result = self
            .register_processing_failure_in(&mut tx, item_id, failure)
            .await;
        finish(tx, result).await
    }

    async fn register_processing_failure_in(
        &self,
        tx: &mut T::Transaction,
        item_id: &M::Id,
        failure: &ConsumerError,
    ) -> Result<ItemOutcome, BoxError> {
        let Some(mut state) = self.module.queueing_state(tx, item_id).await? else {
            warn!(item_id = ?item_id, "no queued item found to register failed attempt");
            return Ok(ItemOutcome::VanishedOnFailure);
        };

        let now = self.clock.now();
        state.register_attempt_failure(now, failure);

        // post-mutation の値で問い合わせる
        let last_attempt_time = state.last_attempt_time().unwrap_or(now);
        let attempt_count = state.attempt_count();
        let outcome = match self
            .retry_policy
            .next_attempt_time(last_attempt_time, attempt_count)
        {
            Some(next_attempt_time) => {
                info!(
                    item_id = ?item_id,
                    attempt_count,
                    %next_attempt_time,
                    "retry for item scheduled"
                );
                state.schedule_next_attempt(next_attempt_time);
                ItemOutcome::RetryScheduled { next_attempt_time }
            }
            None => {
                warn!(item_id = ?item_id, attempt_count, "no retry scheduled for item");
                ItemOutcome::Abandoned
            }
        };

        self.module.save_queueing_state(tx, item_id, &state).await?;
        Ok(outcome)
    }
}

/// Commit on success, roll back on failure.
async fn finish<Tx: Transaction, R>(tx: Tx, result: Result<R, BoxError>) -> Result<R, BoxError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(transaction_error)?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                warn!(error = %rollback_error, "rollback failed");
            }
            Err(error)
        }
    }
}

fn transaction_error(source: BoxError) -> BoxError {
    Box::new(ConsumerError::Transaction(source))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

//! In-memory queue store with write-set transactions.
//!
//! Not durable. Meant for tests, demos and as a reference for what a real
//! store has to guarantee:
//! - reads inside a transaction see its own writes, then committed data
//! - commit applies the whole write set under one lock, or nothing
//! - dropping an uncommitted transaction discards its writes

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{BoxError, ItemId, QueueingState, QueueingStatus};
use crate::ports::{Transaction, TransactionManager};

/// Counts by queueing status, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub not_attempted: usize,
    pub succeeded: usize,
    pub retry_scheduled: usize,
    pub abandoned: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.not_attempted + self.succeeded + self.retry_scheduled + self.abandoned
    }
}

struct Shared<Id> {
    items: Mutex<BTreeMap<Id, QueueingState>>,
    transactions_begun: AtomicUsize,
    transactions_committed: AtomicUsize,
    /// Number of upcoming commits that fail (failure injection).
    failing_commits: AtomicUsize,
    /// Number of upcoming due-item fetches that fail (failure injection).
    failing_fetches: AtomicUsize,
}

/// In-memory queue (cheap to clone, clones share storage).
pub struct InMemoryQueue<Id> {
    shared: Arc<Shared<Id>>,
}

impl<Id> Clone for InMemoryQueue<Id> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Id: ItemId + Ord> Default for InMemoryQueue<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: ItemId + Ord> InMemoryQueue<Id> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(BTreeMap::new()),
                transactions_begun: AtomicUsize::new(0),
                transactions_committed: AtomicUsize::new(0),
                failing_commits: AtomicUsize::new(0),
                failing_fetches: AtomicUsize::new(0),
            }),
        }
    }

    /// Enqueue an item, due at `now`. Re-enqueueing an existing id resets it.
    pub async fn enqueue(&self, item_id: Id, now: DateTime<Utc>) {
        self.insert(item_id, QueueingState::enqueued(now)).await;
    }

    /// Store an arbitrary state (outside any transaction).
    pub async fn insert(&self, item_id: Id, state: QueueingState) {
        self.shared.items.lock().await.insert(item_id, state);
    }

    /// Delete an item (outside any transaction).
    pub async fn remove(&self, item_id: &Id) -> Option<QueueingState> {
        self.shared.items.lock().await.remove(item_id)
    }

    /// Committed state of an item.
    pub async fn state(&self, item_id: &Id) -> Option<QueueingState> {
        self.shared.items.lock().await.get(item_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.shared.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.items.lock().await.is_empty()
    }

    pub async fn counts(&self) -> QueueCounts {
        let items = self.shared.items.lock().await;
        let mut counts = QueueCounts::default();
        for state in items.values() {
            match (state.status(), state.is_terminal()) {
                (QueueingStatus::NotAttempted, _) => counts.not_attempted += 1,
                (QueueingStatus::Succeeded, _) => counts.succeeded += 1,
                (QueueingStatus::Failed, false) => counts.retry_scheduled += 1,
                (QueueingStatus::Failed, true) => counts.abandoned += 1,
            }
        }
        counts
    }

    /// Up to `limit` due ids, earliest next attempt first, then by id.
    pub async fn due_item_ids(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Id>, BoxError> {
        if take_one(&self.shared.failing_fetches) {
            return Err("injected fetch failure".into());
        }

        let items = self.shared.items.lock().await;
        let mut due: Vec<(DateTime<Utc>, &Id)> = items
            .iter()
            .filter_map(|(id, state)| {
                state
                    .next_attempt_time()
                    .filter(|t| *t <= now)
                    .map(|t| (t, id))
            })
            .collect();
        due.sort();
        Ok(due.into_iter().take(limit).map(|(_, id)| id.clone()).collect())
    }

    pub fn transaction_manager(&self) -> InMemoryTransactionManager<Id> {
        InMemoryTransactionManager {
            queue: self.clone(),
        }
    }

    /// Make the next `n` commits fail.
    pub fn fail_next_commits(&self, n: usize) {
        self.shared.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` due-item fetches fail.
    pub fn fail_next_fetches(&self, n: usize) {
        self.shared.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn transactions_begun(&self) -> usize {
        self.shared.transactions_begun.load(Ordering::SeqCst)
    }

    pub fn transactions_committed(&self) -> usize {
        self.shared.transactions_committed.load(Ordering::SeqCst)
    }
}

/// Decrement `counter` if positive. Returns whether it was.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Opens [`InMemoryTransaction`]s on an [`InMemoryQueue`].
pub struct InMemoryTransactionManager<Id> {
    queue: InMemoryQueue<Id>,
}

#[async_trait]
impl<Id: ItemId + Ord> TransactionManager for InMemoryTransactionManager<Id> {
    type Transaction = InMemoryTransaction<Id>;

    async fn begin(&self) -> Result<Self::Transaction, BoxError> {
        self.queue
            .shared
            .transactions_begun
            .fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryTransaction {
            queue: self.queue.clone(),
            writes: BTreeMap::new(),
        })
    }
}

/// Write set over the committed map.
pub struct InMemoryTransaction<Id> {
    queue: InMemoryQueue<Id>,
    writes: BTreeMap<Id, QueueingState>,
}

impl<Id: ItemId + Ord> InMemoryTransaction<Id> {
    pub async fn get(&self, item_id: &Id) -> Option<QueueingState> {
        if let Some(state) = self.writes.get(item_id) {
            return Some(state.clone());
        }
        self.queue.state(item_id).await
    }

    pub fn put(&mut self, item_id: Id, state: QueueingState) {
        self.writes.insert(item_id, state);
    }
}

#[async_trait]
impl<Id: ItemId + Ord> Transaction for InMemoryTransaction<Id> {
    async fn commit(self) -> Result<(), BoxError> {
        let shared = &self.queue.shared;
        if take_one(&shared.failing_commits) {
            return Err("injected commit failure".into());
        }

        let mut items = shared.items.lock().await;
        for (item_id, state) in self.writes {
            // 並行して削除された item は復活させない
            match items.get_mut(&item_id) {
                Some(slot) => *slot = state,
                None => debug!(item_id = ?item_id, "dropping write to removed item"),
            }
        }
        shared.transactions_committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn due_items_are_ordered_and_limited() {
        let queue = InMemoryQueue::<u64>::new();
        queue.enqueue(3, t0()).await;
        queue.enqueue(1, t0() + TimeDelta::seconds(1)).await;
        queue.enqueue(2, t0()).await;
        queue.enqueue(4, t0() + TimeDelta::hours(1)).await;

        let now = t0() + TimeDelta::seconds(5);
        assert_eq!(queue.due_item_ids(now, 10).await.unwrap(), vec![2, 3, 1]);
        assert_eq!(queue.due_item_ids(now, 2).await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let queue = InMemoryQueue::<u64>::new();
        queue.enqueue(1, t0()).await;

        let mut tx = queue.transaction_manager().begin().await.unwrap();
        let mut state = tx.get(&1).await.unwrap();
        state.register_attempt_success(t0());
        tx.put(1, state.clone());

        // 未コミットの書き込みは外から見えない
        assert_eq!(queue.state(&1).await.unwrap().attempt_count(), 0);
        assert_eq!(tx.get(&1).await, Some(state.clone()));

        tx.commit().await.unwrap();
        assert_eq!(queue.state(&1).await, Some(state));
        assert_eq!(queue.transactions_committed(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let queue = InMemoryQueue::<u64>::new();
        queue.enqueue(1, t0()).await;

        {
            let mut tx = queue.transaction_manager().begin().await.unwrap();
            let mut state = tx.get(&1).await.unwrap();
            state.register_attempt_failure(t0(), &"boom");
            tx.put(1, state);
        }

        assert_eq!(queue.state(&1).await, Some(QueueingState::enqueued(t0())));
        assert_eq!(queue.transactions_begun(), 1);
        assert_eq!(queue.transactions_committed(), 0);
    }

    #[tokio::test]
    async fn injected_commit_failure_discards_writes() {
        let queue = InMemoryQueue::<u64>::new();
        queue.enqueue(1, t0()).await;
        queue.fail_next_commits(1);

        let mut tx = queue.transaction_manager().begin().await.unwrap();
        let mut state = tx.get(&1).await.unwrap();
        state.register_attempt_success(t0());
        tx.put(1, state);

        assert!(tx.commit().await.is_err());
        assert_eq!(queue.state(&1).await.unwrap().attempt_count(), 0);

        // 失敗は 1 回だけ
        let tx = queue.transaction_manager().begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }

    #[tokio::test]
    async fn commit_does_not_resurrect_removed_items() {
        let queue = InMemoryQueue::<u64>::new();
        queue.enqueue(1, t0()).await;

        let mut tx = queue.transaction_manager().begin().await.unwrap();
        let state = tx.get(&1).await.unwrap();
        tx.put(1, state);
        queue.remove(&1).await;
        tx.commit().await.unwrap();

        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn counts_by_status() {
        let queue = InMemoryQueue::<u64>::new();
        queue.enqueue(1, t0()).await;

        let mut succeeded = QueueingState::enqueued(t0());
        succeeded.register_attempt_success(t0());
        queue.insert(2, succeeded).await;

        let mut retrying = QueueingState::enqueued(t0());
        retrying.register_attempt_failure(t0(), &"x");
        retrying.schedule_next_attempt(t0() + TimeDelta::seconds(1));
        queue.insert(3, retrying).await;

        let mut abandoned = QueueingState::enqueued(t0());
        abandoned.register_attempt_failure(t0(), &"x");
        queue.insert(4, abandoned).await;

        let counts = queue.counts().await;
        assert_eq!(
            counts,
            QueueCounts {
                not_attempted: 1,
                succeeded: 1,
                retry_scheduled: 1,
                abandoned: 1,
            }
        );
        assert_eq!(counts.total(), 4);
        assert_eq!(queue.len().await, 4);
    }

    #[tokio::test]
    async fn injected_fetch_failure() {
        let queue = InMemoryQueue::<u64>::new();
        queue.enqueue(1, t0()).await;
        queue.fail_next_fetches(1);

        assert!(queue.due_item_ids(t0(), 10).await.is_err());
        assert_eq!(queue.due_item_ids(t0(), 10).await.unwrap(), vec![1]);
    }
}

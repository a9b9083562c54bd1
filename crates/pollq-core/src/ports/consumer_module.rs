//! ConsumerModule port - the storage/domain side of a queue.
//!
//! One implementation per queued entity type. It knows how to find due items,
//! load and store their [`QueueingState`], and run the actual work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BoxError, ItemId, QueueingState};

/// ConsumerModule は 1 種類のキュー対象を扱う
///
/// # 設計原則
/// - Every method except `find_due_item_ids` runs inside a transaction
///   opened by the consumer and receives it as `tx`.
/// - `None` from `queueing_state` / `process_item` means the item no longer
///   exists. That is not an error.
/// - Returned states are owned copies. Mutations only reach storage through
///   `save_queueing_state` within the same transaction.
#[async_trait]
pub trait ConsumerModule: Send + Sync {
    type Id: ItemId;
    type Transaction: Send;

    /// Up to `limit` ids whose next attempt time is at or before `now`, in a
    /// deterministic order.
    async fn find_due_item_ids(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Self::Id>, BoxError>;

    /// Current queueing state of an item.
    async fn queueing_state(
        &self,
        tx: &mut Self::Transaction,
        item_id: &Self::Id,
    ) -> Result<Option<QueueingState>, BoxError>;

    /// Do the domain work for one item.
    ///
    /// `current` is the 1-based position within the batch of `total` items.
    /// Returns the item's queueing state for success bookkeeping.
    async fn process_item(
        &self,
        tx: &mut Self::Transaction,
        item_id: &Self::Id,
        current: usize,
        total: usize,
    ) -> Result<Option<QueueingState>, BoxError>;

    /// Persist a mutated queueing state.
    async fn save_queueing_state(
        &self,
        tx: &mut Self::Transaction,
        item_id: &Self::Id,
        state: &QueueingState,
    ) -> Result<(), BoxError>;
}

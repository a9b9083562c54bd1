//! InMemoryModule - ConsumerModule over an InMemoryQueue.
//!
//! The domain work is delegated to an [`ItemHandler`], so a queue of anything
//! can be consumed by plugging in a handler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::memory::{InMemoryQueue, InMemoryTransaction};
use crate::domain::{BoxError, ItemId, QueueingState};
use crate::ports::ConsumerModule;

/// Domain logic for one queued item.
///
/// `state` is the item's queueing state before this attempt.
#[async_trait]
pub trait ItemHandler<Id>: Send + Sync {
    async fn handle(&self, item_id: &Id, state: &QueueingState) -> Result<(), BoxError>;
}

pub struct InMemoryModule<Id, H> {
    queue: InMemoryQueue<Id>,
    handler: H,
}

impl<Id: ItemId + Ord, H: ItemHandler<Id>> InMemoryModule<Id, H> {
    pub fn new(queue: InMemoryQueue<Id>, handler: H) -> Self {
        Self { queue, handler }
    }

    pub fn queue(&self) -> &InMemoryQueue<Id> {
        &self.queue
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait]
impl<Id: ItemId + Ord, H: ItemHandler<Id>> ConsumerModule for InMemoryModule<Id, H> {
    type Id = Id;
    type Transaction = InMemoryTransaction<Id>;

    async fn find_due_item_ids(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Id>, BoxError> {
        self.queue.due_item_ids(now, limit).await
    }

    async fn queueing_state(
        &self,
        tx: &mut Self::Transaction,
        item_id: &Id,
    ) -> Result<Option<QueueingState>, BoxError> {
        Ok(tx.get(item_id).await)
    }

    async fn process_item(
        &self,
        tx: &mut Self::Transaction,
        item_id: &Id,
        _current: usize,
        _total: usize,
    ) -> Result<Option<QueueingState>, BoxError> {
        let Some(state) = tx.get(item_id).await else {
            return Ok(None);
        };
        self.handler.handle(item_id, &state).await?;
        Ok(Some(state))
    }

    async fn save_queueing_state(
        &self,
        tx: &mut Self::Transaction,
        item_id: &Id,
        state: &QueueingState,
    ) -> Result<(), BoxError> {
        tx.put(item_id.clone(), state.clone());
        Ok(())
    }
}

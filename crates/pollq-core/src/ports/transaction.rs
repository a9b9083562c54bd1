//! Transaction port - scoped unit of work.
//!
//! # Contract
//! - `begin()` opens a transaction.
//! - `commit()` makes every write of the transaction visible at once, or
//!   fails and makes none of them visible.
//! - `rollback()`, and dropping a transaction without committing, discard
//!   every write. This is what guarantees "commit or rollback on every exit
//!   path": an early return or a cancelled future simply drops the value.
//!
//! The isolation level is the implementor's business; read-committed or
//! stronger is assumed.

use async_trait::async_trait;

use crate::domain::BoxError;

/// TransactionManager はトランザクションを開始する
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Transaction: Transaction;

    async fn begin(&self) -> Result<Self::Transaction, BoxError>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait Transaction: Send + Sized {
    async fn commit(self) -> Result<(), BoxError>;

    async fn rollback(self) -> Result<(), BoxError>;
}

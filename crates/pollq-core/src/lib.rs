//! pollq-core
//!
//! Core building blocks of a polling queue consumer: periodically find due
//! items, process each one in its own transaction, and reschedule failures
//! through a pluggable retry policy.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（QueueingState, ItemId, ItemOutcome, CycleReport, errors）
//! - **ports**: 抽象化レイヤー（ConsumerModule, TransactionManager, Clock）
//! - **retry**: RetryPolicy と LimitedRetryPolicy などの実装
//! - **app**: QueueConsumer と builder
//! - **config**: ConsumerConfig（JSON / 環境変数）
//! - **impls**: in-memory 実装（テスト・デモ用）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod retry;

pub use app::{QueueConsumer, QueueConsumerBuilder};
pub use config::{ConsumerConfig, RetryConfig};
pub use domain::{BoxError, ConsumerError, CycleReport, ItemId, ItemOutcome, QueueingState, QueueingStatus};
pub use ports::{Clock, ConsumerModule, SystemClock, Transaction, TransactionManager};
pub use retry::{LimitedRetryPolicy, RetryPolicy};

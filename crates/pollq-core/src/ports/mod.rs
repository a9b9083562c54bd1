//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。consumer が外部に求めるものだけを
//! trait として定義し、実装の詳細（PostgreSQL, in-memory, ...）は隠蔽します。
//!
//! # 設計原則
//! - storage が QueueingState の正本（source of truth）
//! - consumer は 1 トランザクションの間だけ state のコピーを持つ

pub mod clock;
pub mod consumer_module;
pub mod transaction;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::consumer_module::ConsumerModule;
pub use self::transaction::{Transaction, TransactionManager};

//! Impls - 実装（開発用・テスト用）
//!
//! ports の in-memory 実装。本番用の実装（PostgreSQL など）は別クレートに置く想定です。
//!
//! # 含まれる実装
//! - **InMemoryQueue**: QueueingState の保存先 + TransactionManager
//! - **InMemoryModule**: ItemHandler に処理を委譲する ConsumerModule

pub mod memory;
pub mod module;

// 主要な型を再エクスポート
pub use self::memory::{InMemoryQueue, InMemoryTransaction, InMemoryTransactionManager, QueueCounts};
pub use self::module::{InMemoryModule, ItemHandler};

//! App - アプリケーション層
//!
//! ports を組み合わせて polling consumer を実装します。
//!
//! # 主要コンポーネント
//! - **QueueConsumerBuilder**: 構築と起動時検証
//! - **QueueConsumer**: polling ループ（fetch→process→success|failure）

pub mod builder;
pub mod consumer;

// 主要な型を再エクスポート
pub use self::builder::QueueConsumerBuilder;
pub use self::consumer::QueueConsumer;

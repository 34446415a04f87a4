//! # リポジトリ実装
//!
//! 配信レコードの永続化を担当する。
//!
//! - **トレイトで抽象化**: 配信ユースケースは [`DeliveryRecordRepository`] のみに依存する
//! - **sqlx のランタイムクエリ**: PostgreSQL 固有の処理をカプセル化

pub mod delivery_record_repository;

pub use delivery_record_repository::{DeliveryRecordRepository, PostgresDeliveryRecordRepository};

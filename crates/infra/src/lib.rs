//! # Cascade インフラ層
//!
//! 外部の配信・保存バックエンドとの通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **配信アダプタ**: メール API / SES / SMTP / S3 互換バケットを
//!   [`DeliveryAdapter`] の統一された試行契約の裏に包む
//! - **終端シンク**: 常に成功する最後の記録先（構造化ログ、ローカルディスク）
//! - **配信レコードの永続化**: PostgreSQL への INSERT
//!
//! ## 依存関係
//!
//! ```text
//! delivery → infra → domain
//!               ↘
//!                shared
//! ```
//!
//! ## モジュール構成
//!
//! - [`adapter`] - 配信アダプタトレイト
//! - [`notification`] - メール配信アダプタ
//! - [`storage`] - アセット保存アダプタ
//! - [`terminal`] - 終端ログシンク
//! - [`db`] - PostgreSQL 接続管理
//! - [`repository`] - 配信レコードリポジトリ
//! - [`error`] - インフラ層エラー定義

pub mod adapter;
pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod repository;
pub mod storage;
pub mod terminal;

pub use adapter::DeliveryAdapter;
pub use error::{InfraError, InfraErrorKind};
pub use terminal::TerminalLogAdapter;

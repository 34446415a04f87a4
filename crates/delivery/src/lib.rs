//! # Cascade 配信層
//!
//! フォールバックチェーンによる多段配信と、それを使う業務ユースケースを提供する。
//!
//! ## 責務
//!
//! - **タイムアウトガード**: アダプタ 1 回の試行に上限時間を課す（切り離し、中断しない）
//! - **フォールバックチェーン**: 配信クラスごとのアダプタの優先順の列
//! - **チェーン実行器**: チェーンを順に試行し、配信レコードを 1 つ返す
//! - **ユースケース**: 見積もり通知メール、参考画像アップロード
//! - **起動**: 環境変数の読み込みとチェーンの組み立て
//!
//! ## 依存関係
//!
//! ```text
//! delivery → infra → domain
//!     ↘        ↘
//!       ─────── shared
//! ```
//!
//! ## モジュール構成
//!
//! - [`timeout_guard`] - 試行 1 回の時間制限
//! - [`chain`] - フォールバックチェーン
//! - [`executor`] - チェーン実行器
//! - [`notification`] - 見積もり通知ユースケース
//! - [`asset`] - 参考画像アップロードユースケース
//! - [`config`] - 環境変数からの設定読み込み
//! - [`bootstrap`] - 設定からのチェーン・サービス組み立て

pub mod asset;
pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod executor;
pub mod notification;
mod persist;
pub mod timeout_guard;

pub use asset::{AssetUploadItem, AssetUploadReport, AssetUploadService};
pub use bootstrap::{BootstrapError, DeliveryServices};
pub use chain::{ChainLink, DeliveryChains, FallbackChain, FallbackChainBuilder};
pub use config::{ConfigError, DeliveryConfig};
pub use executor::FallbackExecutor;
pub use notification::{NotificationService, TemplateRenderer};

//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! `jq` やログ集約基盤で効率的に調査できるよう、ログフィールドの命名規約と
//! ヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! 既存の `tracing::warn!` / `tracing::error!` に `error.category` + `error.kind`
//! フィールドを直接追加する。定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`delivery.adapter`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: エンティティ種別（[`event::entity_type`] の定数を使用）
/// - `event.entity_id`: エンティティ ID（配信では相関 ID）
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const DELIVERY: &str = "delivery";
        pub const NOTIFICATION: &str = "notification";
        pub const ASSET: &str = "asset";
    }

    /// イベントアクション
    pub mod action {
        // 配信
        pub const DELIVERY_ATTEMPTED: &str = "delivery.attempted";
        pub const DELIVERY_COMPLETED: &str = "delivery.completed";
        pub const DELIVERY_DEGRADED: &str = "delivery.degraded";

        // 通知
        pub const NOTIFICATION_DISPATCHED: &str = "notification.dispatched";

        // アセット
        pub const ASSET_BATCH_UPLOADED: &str = "asset.batch_uploaded";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const DELIVERY_RECORD: &str = "delivery_record";
        pub const QUOTATION: &str = "quotation";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
        pub const TIMED_OUT: &str = "timed_out";
        pub const DEGRADED: &str = "degraded";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB、ローカルディスク）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部プロバイダ呼び出し（メール API、SMTP、オブジェクトストレージ）
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const TEMPLATE: &str = "template";
        pub const TERMINAL_DEGRADED: &str = "terminal_degraded";
        pub const SINK_WRITE: &str = "sink_write";
        pub const PROVIDER: &str = "provider";
    }
}

//! # Cascade ドメイン層
//!
//! 多段フォールバック配信エンジンのドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! このクレートは I/O を一切持たない純粋なデータモデルのみを提供する:
//!
//! - **配信リクエスト**: 相関 ID と不変のペイロード（メール / アセット）
//! - **試行結果**: アダプタ 1 回分の結果（成功 / 失敗 / タイムアウト）
//! - **配信レコード**: チェーン走査 1 回分の不変な監査証跡
//! - **通知イベント**: 見積もり依頼に伴うメール通知の種類
//!
//! ## 依存関係の方向
//!
//! ```text
//! delivery → infra → domain
//!     ↘               ↑
//!       ─────────────
//! ```
//!
//! ドメイン層はインフラ層（SMTP、S3、DB）には一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`clock`] - 時刻プロバイダ
//! - [`delivery`] - 配信リクエスト・試行結果・配信レコード
//! - [`notification`] - 見積もり依頼の通知イベント
//!
//! ## 使用例
//!
//! ```rust
//! use cascade_domain::delivery::{DeliveryClass, DeliveryRequest, EmailMessage};
//!
//! let request = DeliveryRequest::new(
//!     EmailMessage {
//!         to:        "studio@example.com".to_string(),
//!         subject:   "見積もり依頼".to_string(),
//!         html_body: "<p>本文</p>".to_string(),
//!         text_body: "本文".to_string(),
//!         reply_to:  None,
//!     }
//!     .into(),
//! );
//! assert_eq!(request.class(), DeliveryClass::Email);
//! ```

#[macro_use]
mod macros;

pub mod clock;
pub mod delivery;
pub mod notification;

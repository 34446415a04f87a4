//! # 配信
//!
//! 多段フォールバック配信のドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`DeliveryRequest`] | 配信リクエスト | 相関 ID + 不変のペイロード。実行器に 1 回だけ消費される |
//! | [`AdapterOutcome`] | 試行結果 | アダプタ 1 回分の結果。アダプタ境界の外に例外を出さない |
//! | [`DeliveryRecord`] | 配信レコード | チェーン走査 1 回分の不変な監査証跡 |
//! | [`DeliveryStatus`] | 最終ステータス | `Delivered` / `DeliveredViaFallback` / `LoggedOnly` |
//!
//! ## 設計方針
//!
//! - **失敗は値で表す**: プロバイダの失敗はすべて [`AdapterOutcome`] に畳み込まれ、
//!   最終的に [`DeliveryStatus`] に集約される
//! - **不変性**: リクエストとレコードは生成後に変更できない

mod outcome;
mod record;
mod request;

pub use outcome::{AdapterOutcome, FailureKind};
pub use record::{AttemptRecord, DeliveryRecord, DeliveryStatus, NewDeliveryRecord};
pub use request::{
    AssetPayload,
    CorrelationId,
    DeliveryClass,
    DeliveryPayload,
    DeliveryRequest,
    EmailMessage,
};

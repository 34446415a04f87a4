//! # 通知
//!
//! 見積もり依頼に伴うメール通知のドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`QuotationNotification`] | 見積もり通知イベント | 依頼保存後にスタジオと顧客へ送る 2 種類 |
//! | [`QuotationSummary`] | 見積もり依頼の要約 | テンプレートに渡す表示用の値 |
//!
//! ## 設計方針
//!
//! - **配信劣化は業務処理を止めない**: 見積もり依頼の保存は通知結果に関わらず確定する
//! - **テンプレート分離**: 通知イベントとメール生成は分離（TemplateRenderer は delivery クレート）

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

define_uuid_id! {
    /// 見積もり依頼 ID
    ///
    /// CRUD 層が発番した ID を引き継ぐ。
    pub struct QuotationId;
}

/// 通知生成エラー
#[derive(Debug, Error)]
pub enum NotificationError {
    /// テンプレートの登録・レンダリングに失敗
    #[error("テンプレートレンダリングに失敗: {0}")]
    TemplateFailed(String),
}

/// 通知種別
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    /// スタジオ宛の新着依頼通知
    StudioAlert,
    /// 顧客宛の受付確認
    CustomerConfirmation,
}

/// 見積もり依頼の要約
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotationSummary {
    pub quotation_id:          QuotationId,
    pub customer_name:         String,
    pub customer_email:        String,
    /// イベント種別名（例: 結婚式）
    pub event_type_name:       String,
    /// 撮影種別名（例: スチール撮影）
    pub photography_type_name: String,
    pub event_date:            Option<NaiveDate>,
    pub message:               Option<String>,
    /// アップロードに成功した参考画像の枚数
    pub reference_image_count: usize,
}

/// 見積もり通知イベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotationNotification {
    /// 新着依頼をスタジオに知らせる（返信先は顧客）
    StudioAlert {
        quotation:    QuotationSummary,
        studio_email: String,
    },
    /// 顧客に受付を知らせる
    CustomerConfirmation { quotation: QuotationSummary },
}

impl QuotationNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::StudioAlert { .. } => NotificationKind::StudioAlert,
            Self::CustomerConfirmation { .. } => NotificationKind::CustomerConfirmation,
        }
    }

    pub fn quotation(&self) -> &QuotationSummary {
        match self {
            Self::StudioAlert { quotation, .. } | Self::CustomerConfirmation { quotation } => {
                quotation
            }
        }
    }

    /// 受信者のメールアドレス
    pub fn recipient_email(&self) -> &str {
        match self {
            Self::StudioAlert { studio_email, .. } => studio_email,
            Self::CustomerConfirmation { quotation } => &quotation.customer_email,
        }
    }

    /// 返信先（スタジオ宛通知のみ顧客アドレス）
    pub fn reply_to(&self) -> Option<&str> {
        match self {
            Self::StudioAlert { quotation, .. } => Some(&quotation.customer_email),
            Self::CustomerConfirmation { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn summary() -> QuotationSummary {
        QuotationSummary {
            quotation_id:          QuotationId::new(),
            customer_name:         "山田花子".to_string(),
            customer_email:        "hanako@example.com".to_string(),
            event_type_name:       "結婚式".to_string(),
            photography_type_name: "スチール撮影".to_string(),
            event_date:            NaiveDate::from_ymd_opt(2026, 11, 3),
            message:               None,
            reference_image_count: 2,
        }
    }

    #[test]
    fn test_スタジオ宛通知の宛先と返信先() {
        let sut = QuotationNotification::StudioAlert {
            quotation:    summary(),
            studio_email: "studio@example.com".to_string(),
        };

        assert_eq!(sut.kind(), NotificationKind::StudioAlert);
        assert_eq!(sut.recipient_email(), "studio@example.com");
        assert_eq!(sut.reply_to(), Some("hanako@example.com"));
    }

    #[test]
    fn test_顧客宛通知は顧客アドレスに送り返信先を持たない() {
        let sut = QuotationNotification::CustomerConfirmation {
            quotation: summary(),
        };

        assert_eq!(sut.kind(), NotificationKind::CustomerConfirmation);
        assert_eq!(sut.recipient_email(), "hanako@example.com");
        assert_eq!(sut.reply_to(), None);
    }

    #[test]
    fn test_通知種別の文字列変換() {
        assert_eq!(NotificationKind::StudioAlert.to_string(), "studio_alert");
        let kind: &str = NotificationKind::CustomerConfirmation.into();
        assert_eq!(kind, "customer_confirmation");
    }
}

//! 配信リクエストとペイロード

use std::{fmt, path::Path};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::notification::QuotationId;

define_uuid_id! {
    /// 相関 ID
    ///
    /// リクエスト生成時に 1 回だけ発番し、全試行・配信レコード・ログで共有する。
    pub struct CorrelationId;
}

/// 配信クラス
///
/// クラスごとに独立したフォールバックチェーンを持つ。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryClass {
    /// メール通知
    Email,
    /// 参考画像などのアセットアップロード
    AssetUpload,
}

/// メールメッセージ
///
/// テンプレートレンダリングの出力。メール系アダプタに渡される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// 送信先メールアドレス
    pub to:        String,
    /// 件名
    pub subject:   String,
    /// HTML 本文
    pub html_body: String,
    /// プレーンテキスト本文
    pub text_body: String,
    /// 返信先アドレス（顧客への返信を想定したスタジオ宛通知で使用）
    pub reply_to:  Option<String>,
}

/// アセット（バイナリ）ペイロード
///
/// `content` は `Bytes` のため、タイムアウト時に切り離されたタスクへ
/// 渡す複製は参照カウントの増加だけで済む。
#[derive(Clone, PartialEq, Eq)]
pub struct AssetPayload {
    /// バイナリ本体
    pub content:      Bytes,
    /// MIME タイプ（例: `image/jpeg`）
    pub content_type: String,
    /// 保存先パス（オブジェクトキー）
    pub target_path:  String,
}

impl AssetPayload {
    pub fn new(
        content: impl Into<Bytes>,
        content_type: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            content:      content.into(),
            content_type: content_type.into(),
            target_path:  target_path.into(),
        }
    }

    /// 見積もり依頼の参考画像ペイロードを作成する
    ///
    /// 保存先は `quotations/{quotation_id}/reference-{index}-{uuid}.{ext}`。
    /// 拡張子はファイル名から取り、取れなければ MIME タイプから推定する。
    pub fn reference_image(
        quotation_id: &QuotationId,
        index: usize,
        file_name: &str,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        let content_type = content_type.into();
        let extension = extension_for(file_name, &content_type);
        let target_path = format!(
            "quotations/{quotation_id}/reference-{index}-{}.{extension}",
            uuid::Uuid::now_v7().simple()
        );

        Self {
            content: content.into(),
            content_type,
            target_path,
        }
    }

    /// バイト数
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

impl fmt::Debug for AssetPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetPayload")
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .field("content_type", &self.content_type)
            .field("target_path", &self.target_path)
            .finish()
    }
}

fn extension_for(file_name: &str, content_type: &str) -> String {
    let from_name = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name.unwrap_or_else(|| {
        match content_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/heic" => "heic",
            _ => "bin",
        }
        .to_string()
    })
}

/// 配信ペイロード
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum DeliveryPayload {
    Email(EmailMessage),
    Asset(AssetPayload),
}

impl DeliveryPayload {
    /// ペイロードに対応する配信クラス
    pub fn class(&self) -> DeliveryClass {
        match self {
            Self::Email(_) => DeliveryClass::Email,
            Self::Asset(_) => DeliveryClass::AssetUpload,
        }
    }
}

/// 配信リクエスト
///
/// 呼び出し元が生成し、実行器が 1 回だけ消費する。生成後は変更できない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    correlation_id: CorrelationId,
    payload:        DeliveryPayload,
}

impl DeliveryRequest {
    /// 新しい相関 ID を発番してリクエストを作成する
    pub fn new(payload: DeliveryPayload) -> Self {
        Self::with_correlation_id(CorrelationId::new(), payload)
    }

    /// 上流（HTTP リクエスト等）の相関 ID を引き継いでリクエストを作成する
    pub fn with_correlation_id(correlation_id: CorrelationId, payload: DeliveryPayload) -> Self {
        Self {
            correlation_id,
            payload,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn payload(&self) -> &DeliveryPayload {
        &self.payload
    }

    pub fn class(&self) -> DeliveryClass {
        self.payload.class()
    }

    /// メールペイロードであれば返す
    pub fn as_email(&self) -> Option<&EmailMessage> {
        match &self.payload {
            DeliveryPayload::Email(email) => Some(email),
            DeliveryPayload::Asset(_) => None,
        }
    }

    /// アセットペイロードであれば返す
    pub fn as_asset(&self) -> Option<&AssetPayload> {
        match &self.payload {
            DeliveryPayload::Asset(asset) => Some(asset),
            DeliveryPayload::Email(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn email() -> EmailMessage {
        EmailMessage {
            to:        "customer@example.com".to_string(),
            subject:   "件名".to_string(),
            html_body: "<p>本文</p>".to_string(),
            text_body: "本文".to_string(),
            reply_to:  None,
        }
    }

    #[test]
    fn test_newは毎回異なる相関idを発番する() {
        let a = DeliveryRequest::new(email().into());
        let b = DeliveryRequest::new(email().into());

        assert_ne!(a.correlation_id(), b.correlation_id());
    }

    #[test]
    fn test_複製しても相関idは変わらない() {
        let request = DeliveryRequest::new(email().into());
        let cloned = request.clone();

        assert_eq!(request.correlation_id(), cloned.correlation_id());
    }

    #[test]
    fn test_ペイロードから配信クラスが決まる() {
        let email_request = DeliveryRequest::new(email().into());
        let asset_request =
            DeliveryRequest::new(AssetPayload::new(vec![1, 2, 3], "image/png", "a.png").into());

        assert_eq!(email_request.class(), DeliveryClass::Email);
        assert!(email_request.as_email().is_some());
        assert!(email_request.as_asset().is_none());
        assert_eq!(asset_request.class(), DeliveryClass::AssetUpload);
        assert_eq!(asset_request.as_asset().map(AssetPayload::size), Some(3));
    }

    #[test]
    fn test_配信クラスの文字列変換() {
        assert_eq!(DeliveryClass::Email.to_string(), "email");
        assert_eq!(DeliveryClass::AssetUpload.to_string(), "asset_upload");
        assert_eq!(
            "asset_upload".parse::<DeliveryClass>().unwrap(),
            DeliveryClass::AssetUpload
        );
    }

    #[rstest]
    #[case("photo.JPG", "image/jpeg", "jpg")]
    #[case("photo", "image/png", "png")]
    #[case("photo.", "image/webp", "webp")]
    #[case("archive.tar.gz", "application/gzip", "gz")]
    #[case("unknown", "application/octet-stream", "bin")]
    fn test_参考画像の拡張子を推定する(
        #[case] file_name: &str,
        #[case] content_type: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(extension_for(file_name, content_type), expected);
    }

    #[test]
    fn test_参考画像の保存先は見積もりidと連番を含む() {
        let quotation_id = QuotationId::new();
        let payload =
            AssetPayload::reference_image(&quotation_id, 2, "venue.png", "image/png", vec![0u8; 4]);

        let prefix = format!("quotations/{quotation_id}/reference-2-");
        assert!(payload.target_path.starts_with(&prefix), "{}", payload.target_path);
        assert!(payload.target_path.ends_with(".png"));
        assert_eq!(payload.content_type, "image/png");
    }

    #[test]
    fn test_アセットのdebug出力はバイト列を展開しない() {
        let payload = AssetPayload::new(vec![0u8; 2048], "image/jpeg", "a.jpg");
        let debug = format!("{payload:?}");

        assert!(debug.contains("<2048 bytes>"));
    }
}

//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで通知メールを HTML/plaintext 両形式で生成する。
//!
//! - **`include_str!` によるコンパイル時埋め込み**: テンプレートはバイナリに埋め込まれる
//! - **件名パターン**: `[Cascade] {通知種別}: ...`
//! - **レンダリング失敗時の代替**: [`fallback_message`] でテンプレートを使わない要約を作る

use cascade_domain::{
    delivery::EmailMessage,
    notification::{NotificationError, QuotationNotification, QuotationSummary},
};
use tera::{Context, Tera};

/// テンプレートレンダラー
///
/// tera テンプレートエンジンをラップし、`QuotationNotification` から
/// `EmailMessage` を生成する。
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    /// 新しいレンダラーインスタンスを作成
    ///
    /// `include_str!` で埋め込んだテンプレートを tera に登録する。
    pub fn new() -> Result<Self, NotificationError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(vec![
                (
                    "studio_alert.html",
                    include_str!("../../templates/notifications/studio_alert.html"),
                ),
                (
                    "studio_alert.txt",
                    include_str!("../../templates/notifications/studio_alert.txt"),
                ),
                (
                    "customer_confirmation.html",
                    include_str!("../../templates/notifications/customer_confirmation.html"),
                ),
                (
                    "customer_confirmation.txt",
                    include_str!("../../templates/notifications/customer_confirmation.txt"),
                ),
            ])
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(Self { engine })
    }

    /// テンプレート未登録のレンダラー（レンダリングが必ず失敗する）
    #[cfg(test)]
    pub(crate) fn without_templates() -> Self {
        Self {
            engine: Tera::default(),
        }
    }

    /// 通知イベントからメールメッセージを生成する
    pub fn render(
        &self,
        notification: &QuotationNotification,
    ) -> Result<EmailMessage, NotificationError> {
        let template_name: &'static str = notification.kind().into();
        let context = build_context(notification.quotation());

        let html_body = self
            .engine
            .render(&format!("{template_name}.html"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        let text_body = self
            .engine
            .render(&format!("{template_name}.txt"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(EmailMessage {
            to: notification.recipient_email().to_string(),
            subject: subject(notification),
            html_body,
            text_body,
            reply_to: notification.reply_to().map(str::to_string),
        })
    }
}

fn build_context(quotation: &QuotationSummary) -> Context {
    let mut context = Context::new();
    context.insert("quotation_id", &quotation.quotation_id.to_string());
    context.insert("customer_name", &quotation.customer_name);
    context.insert("customer_email", &quotation.customer_email);
    context.insert("event_type_name", &quotation.event_type_name);
    context.insert("photography_type_name", &quotation.photography_type_name);
    context.insert(
        "event_date",
        &quotation
            .event_date
            .map(|date| date.format("%Y年%m月%d日").to_string()),
    );
    context.insert("message", &quotation.message);
    context.insert("reference_image_count", &quotation.reference_image_count);
    context
}

/// 件名
pub fn subject(notification: &QuotationNotification) -> String {
    match notification {
        QuotationNotification::StudioAlert { quotation, .. } => format!(
            "[Cascade] 新しい見積もり依頼: {} 様（{}）",
            quotation.customer_name, quotation.event_type_name
        ),
        QuotationNotification::CustomerConfirmation { .. } => {
            "[Cascade] 見積もり依頼を受け付けました".to_string()
        }
    }
}

/// テンプレートを使わずに要約メールを組み立てる
///
/// テンプレートの登録・レンダリングに失敗しても配信自体は止めないための代替。
pub fn fallback_message(notification: &QuotationNotification) -> EmailMessage {
    let quotation = notification.quotation();
    let mut lines = vec![
        format!("受付番号: {}", quotation.quotation_id),
        format!("お名前: {}", quotation.customer_name),
        format!("メール: {}", quotation.customer_email),
        format!("イベント種別: {}", quotation.event_type_name),
        format!("撮影種別: {}", quotation.photography_type_name),
    ];
    if let Some(date) = quotation.event_date {
        lines.push(format!("希望日: {}", date.format("%Y-%m-%d")));
    }
    lines.push(format!("参考画像: {} 枚", quotation.reference_image_count));
    if let Some(message) = &quotation.message {
        lines.push(format!("メッセージ: {message}"));
    }
    let text_body = lines.join("\n");

    EmailMessage {
        to: notification.recipient_email().to_string(),
        subject: subject(notification),
        html_body: format!("<pre>{}</pre>", escape_html(&text_body)),
        text_body,
        reply_to: notification.reply_to().map(str::to_string),
    }
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

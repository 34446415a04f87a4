//! SES 通知送信実装
//!
//! AWS SES v2 API を使用してメールを送信する。
//! SES アカウント / 送信元アドレスの組ごとに 1 インスタンスを生成する。

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sesv2::{
    Client,
    error::SdkError,
    operation::send_email::SendEmailError,
    types::{Body, Content, Destination, EmailContent, Message},
};
use cascade_domain::delivery::{AdapterOutcome, DeliveryClass, DeliveryRequest, EmailMessage};

use crate::adapter::{DeliveryAdapter, class_mismatch};

/// SES 通知送信
///
/// `aws_sdk_sesv2::Client` をラップする。タイムアウトはクライアント生成時の
/// オペレーションタイムアウト（[`create_client`]）で協調的に適用される。
pub struct SesEmailAdapter {
    name:         String,
    client:       Client,
    from_address: String,
}

impl SesEmailAdapter {
    /// 新しい SES 送信インスタンスを作成
    ///
    /// # 引数
    ///
    /// - `client`: AWS SES v2 クライアント
    /// - `from_address`: 送信元メールアドレス（SES で検証済みであること）
    pub fn new(client: Client, from_address: String) -> Self {
        Self {
            name: "ses".to_string(),
            client,
            from_address,
        }
    }

    fn build_content(email: &EmailMessage) -> Result<EmailContent, AdapterOutcome> {
        let content = |data: &str, label: &str| {
            Content::builder()
                .data(data)
                .charset("UTF-8")
                .build()
                .map_err(|e| AdapterOutcome::misconfigured(format!("{label}構築失敗: {e}")))
        };

        let message = Message::builder()
            .subject(content(&email.subject, "件名")?)
            .body(
                Body::builder()
                    .html(content(&email.html_body, "HTML 本文")?)
                    .text(content(&email.text_body, "テキスト本文")?)
                    .build(),
            )
            .build();

        Ok(EmailContent::builder().simple(message).build())
    }
}

/// SES の送信エラーを失敗分類に変換する
fn classify_error<R: std::fmt::Debug>(err: &SdkError<SendEmailError, R>) -> AdapterOutcome {
    match err {
        SdkError::TimeoutError(_) => AdapterOutcome::TimedOut,
        SdkError::ServiceError(service) => classify_service_error(service.err()),
        SdkError::ConstructionFailure(_) => {
            AdapterOutcome::misconfigured(format!("SES リクエスト構築失敗: {err:?}"))
        }
        _ => AdapterOutcome::transient(format!("SES 通信失敗: {err:?}")),
    }
}

/// SES が返したサービスエラーを失敗分類に変換する
fn classify_service_error(e: &SendEmailError) -> AdapterOutcome {
    let reason = format!("SES 送信失敗: {e}");
    if e.is_too_many_requests_exception() || e.is_limit_exceeded_exception() {
        AdapterOutcome::rate_limited(reason)
    } else if e.is_mail_from_domain_not_verified_exception()
        || e.is_account_suspended_exception()
        || e.is_sending_paused_exception()
        || e.is_not_found_exception()
    {
        AdapterOutcome::misconfigured(reason)
    } else if e.is_message_rejected() || e.is_bad_request_exception() {
        AdapterOutcome::rejected(reason)
    } else {
        AdapterOutcome::transient(reason)
    }
}

#[async_trait]
impl DeliveryAdapter for SesEmailAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(adapter = %self.name, correlation_id = %request.correlation_id())
    )]
    async fn attempt(&self, request: &DeliveryRequest, _deadline: Duration) -> AdapterOutcome {
        let Some(email) = request.as_email() else {
            return class_mismatch(&self.name, DeliveryClass::Email, request);
        };
        if self.from_address.trim().is_empty() {
            return AdapterOutcome::misconfigured("SES 送信元アドレスが未設定");
        }

        let content = match Self::build_content(email) {
            Ok(content) => content,
            Err(outcome) => return outcome,
        };
        let destination = Destination::builder().to_addresses(&email.to).build();

        let mut send = self
            .client
            .send_email()
            .from_email_address(&self.from_address)
            .destination(destination)
            .content(content);
        if let Some(reply_to) = &email.reply_to {
            send = send.reply_to_addresses(reply_to);
        }

        match send.send().await {
            Ok(output) => AdapterOutcome::Success {
                external_reference: output.message_id().map(str::to_string),
            },
            Err(err) => classify_error(&err),
        }
    }
}

/// SES クライアントを作成する
///
/// 認証情報は SDK のデフォルト認証チェーンで解決する。
/// `operation_timeout` には SES 用のチェーン期限を渡し、タイムアウトガードより
/// 先に SDK 側で打ち切られるようにする。
pub async fn create_client(region: &str, operation_timeout: Duration) -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .timeout_config(
            aws_config::timeout::TimeoutConfig::builder()
                .operation_timeout(operation_timeout)
                .build(),
        )
        .load()
        .await;

    Client::new(&config)
}

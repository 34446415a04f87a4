//! トランザクションメール API 送信実装
//!
//! Resend 互換の HTTP API（`POST {base_url}/emails`、Bearer 認証）でメールを送信する。
//! チェーンの先頭に置く、最も低コスト・低レイテンシなプロバイダを想定する。

use std::time::Duration;

use async_trait::async_trait;
use cascade_domain::delivery::{AdapterOutcome, DeliveryClass, DeliveryRequest, EmailMessage};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::adapter::{DeliveryAdapter, class_mismatch};

/// トランザクションメール API の設定
#[derive(Debug, Clone)]
pub struct TransactionalApiConfig {
    /// アダプタ名（例: `"resend"`）
    pub name:         String,
    /// API のベース URL（例: `https://api.resend.com`）
    pub base_url:     String,
    /// API キー（未設定なら試行時に `Misconfigured`）
    pub api_key:      Option<String>,
    /// 送信元メールアドレス
    pub from_address: String,
}

/// トランザクションメール API 送信
///
/// `reqwest::Client` を保持し、リクエストごとのタイムアウトに `deadline` を渡す
/// （協調キャンセル対応のトランスポート）。
pub struct TransactionalApiAdapter {
    client: reqwest::Client,
    config: TransactionalApiConfig,
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from:     &'a str,
    to:       [&'a str; 1],
    subject:  &'a str,
    html:     &'a str,
    text:     &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

impl TransactionalApiAdapter {
    /// 新しい送信インスタンスを作成
    ///
    /// `client` は起動時に 1 度だけ生成し、同一プロセスのアダプタ間で共有してよい。
    pub fn new(client: reqwest::Client, config: TransactionalApiConfig) -> Self {
        Self { client, config }
    }

    /// 試行前に検出できる設定不備
    fn missing_configuration(&self) -> Option<&'static str> {
        if self.config.base_url.trim().is_empty() {
            return Some("API ベース URL が未設定");
        }
        if self.config.from_address.trim().is_empty() {
            return Some("送信元アドレスが未設定");
        }
        match self.config.api_key.as_deref() {
            None | Some("") => Some("API キーが未設定"),
            Some(_) => None,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/emails", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(&self, email: &EmailMessage, api_key: &str, deadline: Duration) -> AdapterOutcome {
        let body = SendEmailBody {
            from:     &self.config.from_address,
            to:       [email.to.as_str()],
            subject:  &email.subject,
            html:     &email.html_body,
            text:     &email.text_body,
            reply_to: email.reply_to.as_deref(),
        };

        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return AdapterOutcome::TimedOut,
            Err(e) => return AdapterOutcome::transient(format!("API 接続失敗: {e}")),
        };

        let status = response.status();
        if status.is_success() {
            // 本文が読めなくても送信自体は受理されている
            let id = response
                .json::<SendEmailResponse>()
                .await
                .ok()
                .and_then(|r| r.id);
            return AdapterOutcome::Success {
                external_reference: id,
            };
        }

        let detail = response.text().await.unwrap_or_default();
        classify_status(status, &detail)
    }
}

/// 非 2xx レスポンスを失敗分類に変換する
pub(crate) fn classify_status(status: StatusCode, detail: &str) -> AdapterOutcome {
    let reason = format!("API エラー {}: {}", status.as_u16(), truncate(detail, 200));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdapterOutcome::misconfigured(reason),
        StatusCode::TOO_MANY_REQUESTS => AdapterOutcome::rate_limited(reason),
        StatusCode::REQUEST_TIMEOUT => AdapterOutcome::transient(reason),
        s if s.is_client_error() => AdapterOutcome::rejected(reason),
        _ => AdapterOutcome::transient(reason),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl DeliveryAdapter for TransactionalApiAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(adapter = %self.config.name, correlation_id = %request.correlation_id())
    )]
    async fn attempt(&self, request: &DeliveryRequest, deadline: Duration) -> AdapterOutcome {
        let Some(email) = request.as_email() else {
            return class_mismatch(&self.config.name, DeliveryClass::Email, request);
        };
        if let Some(reason) = self.missing_configuration() {
            return AdapterOutcome::misconfigured(reason);
        }
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        self.send(email, api_key, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use cascade_domain::delivery::{AssetPayload, FailureKind};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;

    fn email_request() -> DeliveryRequest {
        DeliveryRequest::new(
            EmailMessage {
                to:        "customer@example.com".to_string(),
                subject:   "受付のお知らせ".to_string(),
                html_body: "<p>受け付けました</p>".to_string(),
                text_body: "受け付けました".to_string(),
                reply_to:  None,
            }
            .into(),
        )
    }

    fn adapter(base_url: &str, api_key: Option<&str>) -> TransactionalApiAdapter {
        TransactionalApiAdapter::new(
            reqwest::Client::new(),
            TransactionalApiConfig {
                name:         "resend".to_string(),
                base_url:     base_url.to_string(),
                api_key:      api_key.map(str::to_string),
                from_address: "noreply@example.com".to_string(),
            },
        )
    }

    /// `POST /emails` に固定レスポンスを返すモックサーバー
    async fn mock_api(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer key"))
            .respond_with(response)
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, FailureKind::Misconfigured)]
    #[case(StatusCode::FORBIDDEN, FailureKind::Misconfigured)]
    #[case(StatusCode::TOO_MANY_REQUESTS, FailureKind::RateLimited)]
    #[case(StatusCode::UNPROCESSABLE_ENTITY, FailureKind::Rejected)]
    #[case(StatusCode::REQUEST_TIMEOUT, FailureKind::Transient)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, FailureKind::Transient)]
    #[case(StatusCode::SERVICE_UNAVAILABLE, FailureKind::Transient)]
    fn test_ステータスコードを失敗分類に変換する(
        #[case] status: StatusCode,
        #[case] expected: FailureKind,
    ) {
        assert_eq!(classify_status(status, "").failure_kind(), Some(expected));
    }

    #[test]
    fn test_理由は長い本文を切り詰める() {
        let detail = "あ".repeat(500);
        let AdapterOutcome::Failure { reason, .. } = classify_status(StatusCode::BAD_REQUEST, &detail)
        else {
            panic!("Failure であること");
        };

        assert!(reason.chars().count() < 250);
    }

    #[tokio::test]
    async fn test_apiキー未設定ならネットワーク呼び出しなしでmisconfigured() {
        // 到達不能なアドレスでも即座に返ること
        let sut = adapter("http://192.0.2.1:9", None);

        let outcome = sut.attempt(&email_request(), Duration::from_secs(5)).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Misconfigured));
        assert!(!outcome.is_retriable());
    }

    #[tokio::test]
    async fn test_アセットリクエストはmisconfigured() {
        let sut = adapter("http://localhost", Some("key"));
        let request = DeliveryRequest::new(AssetPayload::new(vec![1], "image/png", "a.png").into());

        let outcome = sut.attempt(&request, Duration::from_secs(5)).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Misconfigured));
    }

    #[tokio::test]
    async fn test_2xxならレスポンスのidを外部参照として返す() {
        let server =
            mock_api(ResponseTemplate::new(200).set_body_json(json!({ "id": "re_123" }))).await;
        let sut = adapter(&server.uri(), Some("key"));

        let outcome = sut.attempt(&email_request(), Duration::from_secs(5)).await;

        assert_eq!(outcome, AdapterOutcome::success_with("re_123"));
    }

    #[tokio::test]
    async fn test_送信元と宛先と本文をjsonで送る() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer key"))
            .and(body_json(json!({
                "from": "noreply@example.com",
                "to": ["customer@example.com"],
                "subject": "受付のお知らせ",
                "html": "<p>受け付けました</p>",
                "text": "受け付けました",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "re_456" })))
            .expect(1)
            .mount(&server)
            .await;
        let sut = adapter(&format!("{}/", server.uri()), Some("key"));

        let outcome = sut.attempt(&email_request(), Duration::from_secs(5)).await;

        assert_eq!(outcome, AdapterOutcome::success_with("re_456"));
    }

    #[tokio::test]
    async fn test_2xxで本文が読めなくても成功() {
        let server = mock_api(ResponseTemplate::new(202).set_body_string("accepted")).await;
        let sut = adapter(&server.uri(), Some("key"));

        let outcome = sut.attempt(&email_request(), Duration::from_secs(5)).await;

        assert_eq!(outcome, AdapterOutcome::Success { external_reference: None });
    }

    #[tokio::test]
    async fn test_429ならrate_limited() {
        let server = mock_api(
            ResponseTemplate::new(429).set_body_json(json!({ "message": "slow down" })),
        )
        .await;
        let sut = adapter(&server.uri(), Some("key"));

        let outcome = sut.attempt(&email_request(), Duration::from_secs(5)).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::RateLimited));
        assert!(outcome.is_retriable());
    }

    #[tokio::test]
    async fn test_応答が期限を超えたらtimed_out() {
        let server = mock_api(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "re_late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let sut = adapter(&server.uri(), Some("key"));

        let outcome = sut.attempt(&email_request(), Duration::from_millis(200)).await;

        assert_eq!(outcome, AdapterOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_接続拒否ならtransient() {
        // 解放直後のポートには誰も待ち受けていない
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let sut = adapter(&format!("http://{addr}"), Some("key"));

        let outcome = sut.attempt(&email_request(), Duration::from_secs(5)).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transient));
    }
}

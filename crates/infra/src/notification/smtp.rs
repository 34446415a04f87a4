//! SMTP 通知送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//! 同じリレーでもポート / TLS 方式の組み合わせごとに別アダプタとしてチェーンに並べ、
//! 465（暗黙 TLS）が塞がれている環境でも 587（STARTTLS）で届くようにする。

use std::{fmt, time::Duration};

use async_trait::async_trait;
use cascade_domain::delivery::{AdapterOutcome, DeliveryClass, DeliveryRequest, EmailMessage};
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{self, authentication::Credentials},
};

use crate::adapter::{DeliveryAdapter, class_mismatch};

/// SMTP 接続のセキュリティ方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// 接続直後から TLS（SMTPS、通常 465）
    Tls,
    /// 平文接続後に STARTTLS で昇格（通常 587）
    StartTls,
    /// TLS なし（Mailpit 等のローカルリレー向け）
    Plain,
}

impl SmtpSecurity {
    /// ポート番号から慣例的な方式を推定する
    pub fn for_port(port: u16) -> Self {
        match port {
            465 => Self::Tls,
            587 => Self::StartTls,
            _ => Self::Plain,
        }
    }
}

impl fmt::Display for SmtpSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Tls => "tls",
            Self::StartTls => "starttls",
            Self::Plain => "plain",
        };
        f.write_str(label)
    }
}

/// SMTP 接続設定（1 アダプタ = 1 設定）
#[derive(Clone)]
pub struct SmtpSettings {
    pub host:         String,
    pub port:         u16,
    pub security:     SmtpSecurity,
    /// ユーザー名とパスワード
    pub credentials:  Option<(String, String)>,
    pub from_address: String,
    /// トランスポートのソケットタイムアウト
    pub timeout:      Duration,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("credentials", &self.credentials.as_ref().map(|_| "[REDACTED]"))
            .field("from_address", &self.from_address)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// SMTP 通知送信
///
/// トランスポートの構築に失敗した場合（不正なホスト名等）もパニックせず保持し、
/// 試行時に `Misconfigured` として返す。
pub struct SmtpEmailAdapter {
    name:         String,
    transport:    Result<AsyncSmtpTransport<Tokio1Executor>, String>,
    from_address: String,
    /// トランスポートに設定したソケットタイムアウト（チェーンの期限と揃える）
    timeout:      Duration,
}

impl SmtpEmailAdapter {
    /// 新しい SMTP 送信インスタンスを作成
    ///
    /// アダプタ名は `smtp:{host}:{port}` になる。
    pub fn new(settings: SmtpSettings) -> Self {
        let name = format!("smtp:{}:{}", settings.host, settings.port);
        let transport = build_transport(&settings);
        if let Err(reason) = &transport {
            tracing::warn!(adapter = %name, reason = %reason, "SMTP トランスポートの構築に失敗");
        }

        Self {
            name,
            transport,
            from_address: settings.from_address,
            timeout: settings.timeout,
        }
    }

    /// トランスポートのソケットタイムアウト
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_message(&self, email: &EmailMessage) -> Result<Message, AdapterOutcome> {
        let from: Mailbox = self
            .from_address
            .parse()
            .map_err(|e| AdapterOutcome::misconfigured(format!("送信元アドレス不正: {e}")))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| AdapterOutcome::misconfigured(format!("宛先アドレス不正: {e}")))?;

        let mut builder = Message::builder().from(from).to(to).subject(&email.subject);
        if let Some(reply_to) = &email.reply_to {
            let reply_to: Mailbox = reply_to
                .parse()
                .map_err(|e| AdapterOutcome::misconfigured(format!("返信先アドレス不正: {e}")))?;
            builder = builder.reply_to(reply_to);
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| AdapterOutcome::misconfigured(format!("メッセージ構築失敗: {e}")))
    }
}

fn build_transport(settings: &SmtpSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
    let builder = match settings.security {
        SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| format!("TLS 設定失敗: {e}"))?,
        SmtpSecurity::StartTls => {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| format!("STARTTLS 設定失敗: {e}"))?
        }
        SmtpSecurity::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host),
    };

    let mut builder = builder.port(settings.port).timeout(Some(settings.timeout));
    if let Some((username, password)) = &settings.credentials {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}

/// 認証失敗を示す SMTP 応答コード
const AUTH_FAILURE_CODES: [u16; 3] = [530, 534, 535];

/// SMTP エラーを失敗分類に変換する
fn classify_error(err: &smtp::Error) -> AdapterOutcome {
    let code = err
        .status()
        .and_then(|code| code.to_string().parse::<u16>().ok());
    classify_reply(
        code,
        err.is_permanent(),
        err.is_timeout(),
        format!("SMTP 送信失敗: {err}"),
    )
}

/// 応答コードと lettre のエラー種別から失敗分類を決める
///
/// 4xx（421 / 450 / 451 / 452 を含む）は一時的障害、5xx は恒久的拒否。
/// 応答コードのない接続障害は一時的障害として扱う。
fn classify_reply(
    code: Option<u16>,
    is_permanent: bool,
    is_timeout: bool,
    reason: String,
) -> AdapterOutcome {
    if is_timeout {
        return AdapterOutcome::TimedOut;
    }
    if code.is_some_and(|code| AUTH_FAILURE_CODES.contains(&code)) {
        return AdapterOutcome::misconfigured(reason);
    }
    if is_permanent || code.is_some_and(|code| (500..600).contains(&code)) {
        return AdapterOutcome::rejected(reason);
    }

    AdapterOutcome::transient(reason)
}

#[async_trait]
impl DeliveryAdapter for SmtpEmailAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(adapter = %self.name, correlation_id = %request.correlation_id())
    )]
    async fn attempt(&self, request: &DeliveryRequest, deadline: Duration) -> AdapterOutcome {
        let Some(email) = request.as_email() else {
            return class_mismatch(&self.name, DeliveryClass::Email, request);
        };
        if deadline < self.timeout {
            // ソケットタイムアウトは構築時に固定されるため、短い期限はタイムアウトガードが打ち切る
            tracing::debug!(
                ?deadline,
                transport_timeout = ?self.timeout,
                "試行期限がトランスポートタイムアウトより短い"
            );
        }
        let transport = match &self.transport {
            Ok(transport) => transport,
            Err(reason) => return AdapterOutcome::misconfigured(reason.clone()),
        };
        let message = match self.build_message(email) {
            Ok(message) => message,
            Err(outcome) => return outcome,
        };

        match transport.send(message).await {
            Ok(response) => AdapterOutcome::Success {
                external_reference: response.message().next().map(str::to_string),
            },
            Err(err) => classify_error(&err),
        }
    }
}

//! # 終端ログシンク
//!
//! チェーンの最後に置く、常に成功する配信先。
//!
//! 配信内容を構造化ログ（`tracing` の warn）として出力し、ファイルパスが
//! 設定されていれば JSON Lines 形式で追記する。ファイル書き込みに失敗した場合は
//! 上限付きのメモリバッファに保持し、それでも `Success` を返す。
//!
//! 試行ごとに新しい [`TerminalEntryId`] を発番して外部参照として返す。
//! 同一リクエストを 2 回記録しても重複排除しない。

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use cascade_domain::delivery::{
    AdapterOutcome,
    CorrelationId,
    DeliveryClass,
    DeliveryPayload,
    DeliveryRequest,
};
use cascade_shared::event_log::error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{adapter::DeliveryAdapter, error::InfraError};

/// メモリバッファに保持するエントリ数の上限
pub const MEMORY_BUFFER_CAPACITY: usize = 1_000;

/// 終端ログエントリ ID（UUID v7）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, derive_more::Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct TerminalEntryId(Uuid);

impl TerminalEntryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TerminalEntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// 終端ログに残すペイロード
///
/// メールは本文まで、アセットはメタデータと Base64 化した内容を保持し、
/// 後から手動で再送できるようにする。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalPayload {
    Email {
        to:        String,
        subject:   String,
        html_body: String,
        text_body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to:  Option<String>,
    },
    Asset {
        target_path:    String,
        content_type:   String,
        size:           usize,
        content_base64: String,
    },
}

/// 終端ログエントリ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalEntry {
    pub entry_id:       TerminalEntryId,
    pub correlation_id: CorrelationId,
    pub class:          DeliveryClass,
    pub recorded_at:    DateTime<Utc>,
    pub payload:        TerminalPayload,
}

impl TerminalEntry {
    /// リクエストから新しいエントリを作成する（毎回新しい ID を発番）
    pub fn from_request(request: &DeliveryRequest, recorded_at: DateTime<Utc>) -> Self {
        let payload = match request.payload() {
            DeliveryPayload::Email(email) => TerminalPayload::Email {
                to:        email.to.clone(),
                subject:   email.subject.clone(),
                html_body: email.html_body.clone(),
                text_body: email.text_body.clone(),
                reply_to:  email.reply_to.clone(),
            },
            DeliveryPayload::Asset(asset) => TerminalPayload::Asset {
                target_path:    asset.target_path.clone(),
                content_type:   asset.content_type.clone(),
                size:           asset.size(),
                content_base64: STANDARD.encode(&asset.content),
            },
        };

        Self {
            entry_id: TerminalEntryId::new(),
            correlation_id: request.correlation_id().clone(),
            class: request.class(),
            recorded_at,
            payload,
        }
    }

    /// 外部参照文字列（`terminal-log:{entry_id}`）
    pub fn reference(&self) -> String {
        format!("terminal-log:{}", self.entry_id)
    }
}

/// 終端ログアダプタ
///
/// `file_path` が `None` の場合はログ出力とメモリバッファのみ。
pub struct TerminalLogAdapter {
    name:      String,
    file_path: Option<PathBuf>,
    memory:    Mutex<VecDeque<TerminalEntry>>,
}

impl TerminalLogAdapter {
    /// ファイル追記付きの終端ログを作成する
    pub fn new(name: impl Into<String>, file_path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file_path,
            memory: Mutex::new(VecDeque::new()),
        }
    }

    /// ログ出力とメモリバッファのみの終端ログを作成する
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// メモリバッファに保持しているエントリ（古い順）
    pub fn entries(&self) -> Vec<TerminalEntry> {
        self.memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn remember(&self, entry: TerminalEntry) {
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        if memory.len() >= MEMORY_BUFFER_CAPACITY {
            memory.pop_front();
        }
        memory.push_back(entry);
    }

    /// エントリを記録し、外部参照を返す
    ///
    /// ファイルへの追記に失敗してもメモリに退避するため、この関数は失敗しない。
    pub(crate) async fn record(&self, entry: TerminalEntry) -> String {
        let reference = entry.reference();
        log_entry(&self.name, &entry);

        match &self.file_path {
            Some(path) => {
                if let Err(e) = append_json_line(path, &entry).await {
                    tracing::warn!(
                        error.category = error::category::INFRASTRUCTURE,
                        error.kind = error::kind::TERMINAL_DEGRADED,
                        adapter = %self.name,
                        path = %path.display(),
                        correlation_id = %entry.correlation_id,
                        "終端ログのファイル書き込みに失敗、メモリに退避: {}",
                        e
                    );
                    self.remember(entry);
                }
            }
            None => self.remember(entry),
        }

        reference
    }
}

fn log_entry(adapter: &str, entry: &TerminalEntry) {
    match &entry.payload {
        TerminalPayload::Email {
            to,
            subject,
            text_body,
            ..
        } => tracing::warn!(
            adapter,
            entry_id = %entry.entry_id,
            correlation_id = %entry.correlation_id,
            class = %entry.class,
            email.to = %to,
            email.subject = %subject,
            email.text_body = %text_body,
            "配信プロバイダがすべて失敗したため終端ログに記録"
        ),
        TerminalPayload::Asset {
            target_path,
            content_type,
            size,
            ..
        } => tracing::warn!(
            adapter,
            entry_id = %entry.entry_id,
            correlation_id = %entry.correlation_id,
            class = %entry.class,
            asset.target_path = %target_path,
            asset.content_type = %content_type,
            asset.size = size,
            "配信プロバイダがすべて失敗したため終端ログに記録"
        ),
    }
}

/// エントリを 1 行の JSON として追記する（親ディレクトリは必要に応じて作成）
async fn append_json_line(path: &Path, entry: &TerminalEntry) -> Result<(), InfraError> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;

    Ok(())
}

#[async_trait]
impl DeliveryAdapter for TerminalLogAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn attempt(&self, request: &DeliveryRequest, _deadline: Duration) -> AdapterOutcome {
        let entry = TerminalEntry::from_request(request, Utc::now());
        AdapterOutcome::success_with(self.record(entry).await)
    }
}

#[cfg(test)]
mod tests {
    use cascade_domain::delivery::{AssetPayload, EmailMessage};
    use pretty_assertions::assert_eq;

    use super::*;

    fn email_request() -> DeliveryRequest {
        DeliveryRequest::new(
            EmailMessage {
                to:        "studio@example.com".to_string(),
                subject:   "[Cascade] 新しい見積もり依頼".to_string(),
                html_body: "<p>山田太郎 様から</p>".to_string(),
                text_body: "山田太郎 様から".to_string(),
                reply_to:  Some("taro@example.com".to_string()),
            }
            .into(),
        )
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TerminalLogAdapter>();
    }

    #[tokio::test]
    async fn test_同じリクエストでも試行ごとに別の参照を返す() {
        let sut = TerminalLogAdapter::in_memory("terminal-log");
        let request = email_request();

        let first = sut.attempt(&request, Duration::from_secs(1)).await;
        let second = sut.attempt(&request, Duration::from_secs(1)).await;

        assert!(first.is_success());
        assert!(second.is_success());
        assert_ne!(first.external_reference(), second.external_reference());
        assert_eq!(sut.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_ファイルに1行のjsonとして追記する() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("terminal.jsonl");
        let sut = TerminalLogAdapter::new("terminal-log", Some(path.clone()));
        let request = email_request();

        let outcome = sut.attempt(&request, Duration::from_secs(1)).await;
        sut.attempt(&request, Duration::from_secs(1)).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["class"], "email");
        assert_eq!(first["payload"]["kind"], "email");
        assert_eq!(first["payload"]["to"], "studio@example.com");
        assert_eq!(
            first["correlation_id"],
            request.correlation_id().to_string()
        );
        assert_eq!(
            outcome.external_reference(),
            Some(format!("terminal-log:{}", first["entry_id"].as_str().unwrap()).as_str())
        );
        assert!(sut.entries().is_empty(), "書き込み成功時はメモリに残さない");
    }

    #[tokio::test]
    async fn test_ファイル書き込みに失敗してもメモリに退避して成功を返す() {
        let dir = tempfile::tempdir().unwrap();
        // ディレクトリそのものをファイルとして開こうとして失敗させる
        let sut = TerminalLogAdapter::new("terminal-log", Some(dir.path().to_path_buf()));

        let outcome = sut.attempt(&email_request(), Duration::from_secs(1)).await;

        assert!(outcome.is_success());
        let entries = sut.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(outcome.external_reference(), Some(entries[0].reference().as_str()));
    }

    #[tokio::test]
    async fn test_アセットは内容をbase64で保持する() {
        let sut = TerminalLogAdapter::in_memory("asset-terminal-log");
        let request = DeliveryRequest::new(
            AssetPayload::new(vec![0xde, 0xad, 0xbe, 0xef], "image/png", "quotations/q/a.png").into(),
        );

        sut.attempt(&request, Duration::from_secs(1)).await;

        let entries = sut.entries();
        assert_eq!(
            entries[0].payload,
            TerminalPayload::Asset {
                target_path:    "quotations/q/a.png".to_string(),
                content_type:   "image/png".to_string(),
                size:           4,
                content_base64: "3q2+7w==".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_メモリバッファは上限を超えると古いものから捨てる() {
        let sut = TerminalLogAdapter::in_memory("terminal-log");
        let request = email_request();

        for _ in 0..MEMORY_BUFFER_CAPACITY + 5 {
            sut.attempt(&request, Duration::from_secs(1)).await;
        }

        assert_eq!(sut.entries().len(), MEMORY_BUFFER_CAPACITY);
    }

    #[test]
    fn test_終端シンクとして扱われる() {
        assert!(TerminalLogAdapter::in_memory("terminal-log").is_terminal());
    }
}

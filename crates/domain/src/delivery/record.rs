//! 配信レコード

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use strum::IntoStaticStr;

use super::{AdapterOutcome, CorrelationId, DeliveryClass};

/// 最終ステータス
///
/// エラー分類はすべてこの 3 値に集約される。呼び出し元は `LoggedOnly` を
/// 「劣化したが業務処理は継続する」として扱い、ハード障害とはみなさない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, IntoStaticStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    /// チェーン先頭のアダプタで成功
    Delivered,
    /// 2 番目以降の実アダプタで成功
    DeliveredViaFallback,
    /// 実アダプタがすべて失敗し、終端シンクに記録のみ行った
    LoggedOnly,
}

impl DeliveryStatus {
    /// 実プロバイダに届いたか
    pub fn is_delivered(self) -> bool {
        !matches!(self, Self::LoggedOnly)
    }
}

/// 試行 1 回分の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// アダプタ名（例: `"ses"`, `"smtp:mail.example.com:465"`）
    pub adapter_name: String,
    /// 試行結果
    pub outcome:      AdapterOutcome,
    /// 所要時間（JSON ではミリ秒）
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed:      Duration,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// 配信レコード生成用パラメータ
pub struct NewDeliveryRecord {
    pub correlation_id: CorrelationId,
    pub class:          DeliveryClass,
    pub attempts:       Vec<AttemptRecord>,
    pub status:         DeliveryStatus,
    pub cancelled:      bool,
    pub completed_at:   DateTime<Utc>,
}

/// 配信レコード
///
/// 実行器がチェーン走査の最後に 1 回だけ生成する。生成後は不変で、
/// 永続化・観測のために呼び出し元が所有する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    correlation_id: CorrelationId,
    class:          DeliveryClass,
    attempts:       Vec<AttemptRecord>,
    status:         DeliveryStatus,
    cancelled:      bool,
    completed_at:   DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn new(params: NewDeliveryRecord) -> Self {
        Self {
            correlation_id: params.correlation_id,
            class:          params.class,
            attempts:       params.attempts,
            status:         params.status,
            cancelled:      params.cancelled,
            completed_at:   params.completed_at,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn class(&self) -> DeliveryClass {
        self.class
    }

    /// 試行順の記録
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    /// 呼び出し元のキャンセルによって残りのアダプタを打ち切ったか
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// 実プロバイダに届かず記録のみで終わったか
    pub fn is_degraded(&self) -> bool {
        self.status == DeliveryStatus::LoggedOnly
    }

    /// 成功した試行
    pub fn successful_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts
            .iter()
            .rev()
            .find(|attempt| attempt.outcome.is_success())
    }

    /// 成功した試行の外部参照（メッセージ ID、保存先 URL 等）
    pub fn final_reference(&self) -> Option<&str> {
        self.successful_attempt()
            .and_then(|attempt| attempt.outcome.external_reference())
    }

    /// 全試行の所要時間の合計
    pub fn total_elapsed(&self) -> Duration {
        self.attempts.iter().map(|attempt| attempt.elapsed).sum()
    }
}

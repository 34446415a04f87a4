//! 試行結果と失敗分類

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

/// 失敗の分類
///
/// `retriable` はメトリクス・観測のための情報であり、制御フローには影響しない。
/// どの分類でもチェーンは次のアダプタへ進む。
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// 認証情報や必須フィールドの欠落、認証エラー
    Misconfigured,
    /// ネットワーク障害、プロバイダ側の一時的エラー
    Transient,
    /// プロバイダによるスロットリング（429、SlowDown 等）
    RateLimited,
    /// プロバイダが恒久的に拒否（不正な宛先、サイズ超過等）
    Rejected,
}

impl FailureKind {
    /// 同じリクエストを後で再送すれば成功し得るか
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// アダプタ 1 回分の試行結果
///
/// アダプタは境界の外に例外を出さない。すべての失敗経路は
/// `Failure` か `TimedOut` に解決される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdapterOutcome {
    /// 成功（プロバイダ側のメッセージ ID や保存先 URL があれば保持）
    Success {
        external_reference: Option<String>,
    },
    /// 失敗
    Failure {
        kind:      FailureKind,
        reason:    String,
        retriable: bool,
    },
    /// 期限切れ
    TimedOut,
}

impl AdapterOutcome {
    /// 外部参照なしの成功
    pub fn success() -> Self {
        Self::Success {
            external_reference: None,
        }
    }

    /// 外部参照付きの成功
    pub fn success_with(external_reference: impl Into<String>) -> Self {
        Self::Success {
            external_reference: Some(external_reference.into()),
        }
    }

    /// 失敗を生成する（`retriable` は分類から決まる）
    pub fn failure(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            reason: reason.into(),
            retriable: kind.is_retriable(),
        }
    }

    pub fn misconfigured(reason: impl Into<String>) -> Self {
        Self::failure(FailureKind::Misconfigured, reason)
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::failure(FailureKind::Transient, reason)
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self::failure(FailureKind::RateLimited, reason)
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::failure(FailureKind::Rejected, reason)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// ログ出力用のラベル（`success` / `failure` / `timed_out`）
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// 再送で成功し得るか（タイムアウトは一時的障害とみなす）
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Success { .. } => false,
            Self::Failure { retriable, .. } => *retriable,
            Self::TimedOut => true,
        }
    }

    pub fn external_reference(&self) -> Option<&str> {
        match self {
            Self::Success { external_reference } => external_reference.as_deref(),
            _ => None,
        }
    }
}

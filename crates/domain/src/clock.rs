//! # Clock（時刻プロバイダ）
//!
//! 配信レコードの完了時刻を刻むための抽象化。
//! 実行器に注入し、テストでは固定時刻を使う。

use chrono::{DateTime, Utc};

/// 現在時刻を提供するトレイト
///
/// 実行器が並行な `deliver` 呼び出しから共有するため `Send + Sync`。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// システム時刻を返す実装
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定時刻を返すテスト用実装
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

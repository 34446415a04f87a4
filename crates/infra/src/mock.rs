//! # テスト用モック
//!
//! チェーン実行器やユースケースのテストで使用するスクリプト式アダプタと
//! インメモリリポジトリ。`test-utils` feature を有効にすることで、
//! 他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! cascade-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use cascade_domain::delivery::{AdapterOutcome, CorrelationId, DeliveryRecord, DeliveryRequest};

use crate::{adapter::DeliveryAdapter, error::InfraError, repository::DeliveryRecordRepository};

// ===== ScriptedAdapter =====

/// 1 回の試行でのふるまい
#[derive(Debug, Clone)]
pub enum Behavior {
    /// 指定の結果を返す
    Respond(AdapterOutcome),
    /// 永遠に完了しない
    Hang,
    /// パニックする
    Panic,
}

/// 台本どおりに結果を返すアダプタ
///
/// 台本（`then`）を先頭から消費し、尽きたら既定のふるまい（`otherwise`）を繰り返す。
pub struct ScriptedAdapter {
    name:        String,
    terminal:    bool,
    delay:       Duration,
    url_base:    Option<String>,
    script:      Mutex<VecDeque<Behavior>>,
    otherwise:   Behavior,
    calls:       Mutex<Vec<CorrelationId>>,
    completions: AtomicUsize,
}

impl ScriptedAdapter {
    /// 常に成功するアダプタ
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:        name.into(),
            terminal:    false,
            delay:       Duration::ZERO,
            url_base:    None,
            script:      Mutex::new(VecDeque::new()),
            otherwise:   Behavior::Respond(AdapterOutcome::success()),
            calls:       Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
        }
    }

    /// 常に成功するアダプタ
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    /// 常に指定の結果で失敗するアダプタ
    pub fn failing(name: impl Into<String>, outcome: AdapterOutcome) -> Self {
        Self::new(name).otherwise(Behavior::Respond(outcome))
    }

    /// 常に完了しないアダプタ
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::new(name).otherwise(Behavior::Hang)
    }

    /// 台本に 1 回分のふるまいを追加する
    pub fn then(self, behavior: Behavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    /// 台本が尽きた後のふるまい
    pub fn otherwise(mut self, behavior: Behavior) -> Self {
        self.otherwise = behavior;
        self
    }

    /// 結果を返す前に待つ時間
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 成功時、アセットなら `{url_base}/{target_path}` を外部参照として返す
    pub fn with_url_base(mut self, url_base: impl Into<String>) -> Self {
        self.url_base = Some(url_base.into());
        self
    }

    /// 終端シンクとして振る舞う
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// 試行回数
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 試行されたリクエストの相関 ID（試行順）
    pub fn calls(&self) -> Vec<CorrelationId> {
        self.calls.lock().unwrap().clone()
    }

    /// 最後まで実行された試行の数（タイムアウトで切り離された後の完了も含む）
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> Behavior {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone())
    }

    fn decorate(&self, outcome: AdapterOutcome, request: &DeliveryRequest) -> AdapterOutcome {
        match (&outcome, &self.url_base, request.as_asset()) {
            (AdapterOutcome::Success { .. }, Some(base), Some(asset)) => {
                AdapterOutcome::success_with(format!("{base}/{}", asset.target_path))
            }
            _ => outcome,
        }
    }
}

#[async_trait]
impl DeliveryAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }

    async fn attempt(&self, request: &DeliveryRequest, _deadline: Duration) -> AdapterOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(request.correlation_id().clone());
        let behavior = self.next_behavior();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = match behavior {
            Behavior::Respond(outcome) => self.decorate(outcome, request),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("{} はパニックするよう台本に書かれている", self.name),
        };
        self.completions.fetch_add(1, Ordering::SeqCst);

        outcome
    }
}

// ===== MockDeliveryRecordRepository =====

#[derive(Clone, Default)]
pub struct MockDeliveryRecordRepository {
    records: Arc<Mutex<Vec<DeliveryRecord>>>,
    failing: bool,
}

impl MockDeliveryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常に INSERT に失敗するリポジトリ
    pub fn failing() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            failing: true,
        }
    }

    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryRecordRepository for MockDeliveryRecordRepository {
    async fn insert(&self, record: &DeliveryRecord) -> Result<(), InfraError> {
        if self.failing {
            return Err(InfraError::unexpected("モックリポジトリの INSERT 失敗"));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

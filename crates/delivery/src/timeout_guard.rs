//! # タイムアウトガード
//!
//! アダプタの試行を期限と競争させる。
//!
//! 試行は tokio のタスクとして spawn し、その `JoinHandle` を
//! `tokio::time::timeout` で待つ。期限切れの場合はハンドルを手放すだけで
//! タスクは中断しない（切り離し）。遅れて完了した結果は誰にも読まれずに捨てられる。
//!
//! 早く完了した場合はタイマー側が捨てられる。いずれの場合も呼び出し側を
//! ブロックせず、構築中の配信レコードにも触れない。

use std::{sync::Arc, time::Duration};

use cascade_domain::delivery::{AdapterOutcome, DeliveryRequest};
use cascade_infra::DeliveryAdapter;

/// アダプタの試行を `bound` で打ち切る
///
/// 期限内に完了すればアダプタの結果をそのまま返す。期限切れなら
/// [`AdapterOutcome::TimedOut`]、試行タスクがパニックした場合は
/// `Transient` の失敗を返す。この関数自体はパニックを伝播しない。
pub async fn run(
    adapter: Arc<dyn DeliveryAdapter>,
    request: Arc<DeliveryRequest>,
    bound: Duration,
) -> AdapterOutcome {
    let adapter_name = adapter.name().to_string();
    let handle = tokio::spawn(async move { adapter.attempt(&request, bound).await });

    match tokio::time::timeout(bound, handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) if join_error.is_panic() => {
            tracing::error!(adapter = %adapter_name, "アダプタの試行タスクがパニック");
            AdapterOutcome::transient("adapter panicked")
        }
        Ok(Err(join_error)) => {
            AdapterOutcome::transient(format!("adapter task aborted: {join_error}"))
        }
        Err(_elapsed) => {
            tracing::debug!(
                adapter = %adapter_name,
                bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
                "期限切れのため試行を切り離す"
            );
            AdapterOutcome::TimedOut
        }
    }
}

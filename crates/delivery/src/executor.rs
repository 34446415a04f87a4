//! # フォールバックチェーン実行器
//!
//! 1 件の配信リクエストについてチェーンを先頭から順に試行し、
//! 最初の成功で打ち切って [`DeliveryRecord`] を 1 つ返す。
//!
//! ## 走査の規則
//!
//! - 各リンクはタイムアウトガード越しに 1 つずつ試行する（並行試行はしない）
//! - 失敗・タイムアウトは記録して次のリンクへ進む。失敗の種類で走査を止めない
//! - 先頭の成功は `Delivered`、2 番目以降の成功は `DeliveredViaFallback`
//! - 実アダプタがすべて失敗したら終端シンクを試行し `LoggedOnly`
//! - 終端シンクがない、または終端シンク自体が失敗した場合は
//!   実行器が持つ in-process の終端ログ（`synthetic-terminal-log`）に記録する
//! - チェーンの待ち時間が 0 でなければ、2 回目以降の試行の前に待つ
//! - キャンセルされたら残りの実アダプタは飛ばし、終端シンクだけは試行する
//!
//! 実行器はエラーを返さず、アダプタの失敗でパニックしない。

use std::{sync::Arc, time::Duration};

use cascade_domain::{
    clock::Clock,
    delivery::{
        AdapterOutcome,
        AttemptRecord,
        DeliveryRecord,
        DeliveryRequest,
        DeliveryStatus,
        NewDeliveryRecord,
    },
};
use cascade_infra::{DeliveryAdapter, TerminalLogAdapter};
use cascade_shared::{
    event_log::{error, event},
    log_business_event,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    chain::{ChainLink, FallbackChain},
    timeout_guard,
};

/// 実行器が自前で持つ終端ログのアダプタ名
pub const SYNTHETIC_TERMINAL_NAME: &str = "synthetic-terminal-log";

/// 合成終端ログの試行に与える期限
const SYNTHETIC_TERMINAL_DEADLINE: Duration = Duration::from_secs(5);

/// フォールバックチェーン実行器
///
/// 状態は `deliver` 呼び出しごとに閉じており、1 つの実行器を
/// 並行する複数の配信で共有してよい。
pub struct FallbackExecutor {
    clock:              Arc<dyn Clock>,
    synthetic_terminal: Arc<TerminalLogAdapter>,
}

impl FallbackExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            synthetic_terminal: Arc::new(TerminalLogAdapter::in_memory(SYNTHETIC_TERMINAL_NAME)),
        }
    }

    /// 合成終端ログ（チェーンの終端シンクが使えなかった配信の記録先）
    pub fn synthetic_terminal(&self) -> &TerminalLogAdapter {
        &self.synthetic_terminal
    }

    /// リクエストをチェーンに沿って配信する
    pub async fn deliver(&self, request: DeliveryRequest, chain: &FallbackChain) -> DeliveryRecord {
        self.deliver_with_cancel(request, chain, &CancellationToken::new())
            .await
    }

    /// キャンセル可能な配信
    ///
    /// `cancel` は各試行の完了後に確認する。試行中の呼び出しは中断せず、
    /// 完了を待ってから残りの実アダプタを飛ばす。
    pub async fn deliver_with_cancel(
        &self,
        request: DeliveryRequest,
        chain: &FallbackChain,
        cancel: &CancellationToken,
    ) -> DeliveryRecord {
        let span = tracing::info_span!(
            "deliver",
            correlation_id = %request.correlation_id(),
            class = %request.class(),
        );
        self.walk(Arc::new(request), chain, cancel)
            .instrument(span)
            .await
    }

    async fn walk(
        &self,
        request: Arc<DeliveryRequest>,
        chain: &FallbackChain,
        cancel: &CancellationToken,
    ) -> DeliveryRecord {
        if chain.class() != request.class() {
            tracing::warn!(
                chain_class = %chain.class(),
                "配信クラスとチェーンが一致しない（各アダプタが Misconfigured を返す想定）"
            );
        }

        let mut attempts = Vec::with_capacity(chain.links().len() + 1);
        let mut status = None;
        let mut cancelled = false;

        for (index, link) in chain.links().iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if !attempts.is_empty() && !self.pause(chain, cancel).await {
                cancelled = true;
                break;
            }

            let outcome = self.attempt(link, &request, &mut attempts).await;
            if outcome.is_success() {
                status = Some(if index == 0 {
                    DeliveryStatus::Delivered
                } else {
                    DeliveryStatus::DeliveredViaFallback
                });
                break;
            }
        }

        let status = match status {
            Some(status) => status,
            None => {
                // 最後の実アダプタの試行中に届いたキャンセルもここで拾う
                cancelled |= cancel.is_cancelled();
                if cancelled {
                    tracing::info!(
                        skipped = chain.links().len().saturating_sub(attempts.len()),
                        "キャンセルされたため残りのアダプタを飛ばして終端シンクへ"
                    );
                }
                cancelled |= self
                    .run_terminal(chain, &request, &mut attempts, cancelled, cancel)
                    .await;
                DeliveryStatus::LoggedOnly
            }
        };

        let record = DeliveryRecord::new(NewDeliveryRecord {
            correlation_id: request.correlation_id().clone(),
            class: request.class(),
            attempts,
            status,
            cancelled,
            completed_at: self.clock.now(),
        });
        log_record(&record);

        record
    }

    /// 終端シンクを試行し、使えなければ合成終端ログに記録する
    ///
    /// 終端シンク前の待機中にキャンセルされたら `true` を返す。
    async fn run_terminal(
        &self,
        chain: &FallbackChain,
        request: &Arc<DeliveryRequest>,
        attempts: &mut Vec<AttemptRecord>,
        cancelled: bool,
        cancel: &CancellationToken,
    ) -> bool {
        let mut cancelled_in_pause = false;
        if let Some(link) = chain.terminal() {
            // キャンセル済みなら待たずに記録する
            if !cancelled && !attempts.is_empty() {
                cancelled_in_pause = !self.pause(chain, cancel).await;
            }
            if self.attempt(link, request, attempts).await.is_success() {
                return cancelled_in_pause;
            }
            tracing::warn!(
                error.category = error::category::INFRASTRUCTURE,
                error.kind = error::kind::TERMINAL_DEGRADED,
                adapter = link.name(),
                "終端シンクが失敗したため合成終端ログに記録"
            );
        }

        let synthetic: Arc<dyn DeliveryAdapter> = self.synthetic_terminal.clone();
        let link = ChainLink::new(synthetic, SYNTHETIC_TERMINAL_DEADLINE);
        self.attempt(&link, request, attempts).await;
        cancelled_in_pause
    }

    /// 待ち時間を挟む。待機中にキャンセルされたら `false`
    async fn pause(&self, chain: &FallbackChain, cancel: &CancellationToken) -> bool {
        let pause = chain.inter_attempt_pause();
        if pause.is_zero() {
            return true;
        }

        tokio::select! {
            () = tokio::time::sleep(pause) => true,
            () = cancel.cancelled() => false,
        }
    }

    /// 1 リンクを試行して記録する
    async fn attempt(
        &self,
        link: &ChainLink,
        request: &Arc<DeliveryRequest>,
        attempts: &mut Vec<AttemptRecord>,
    ) -> AdapterOutcome {
        let started = Instant::now();
        let outcome =
            timeout_guard::run(link.adapter().clone(), request.clone(), link.deadline()).await;
        let elapsed = started.elapsed();

        log_attempt(link.name(), attempts.len() + 1, &outcome, elapsed);
        attempts.push(AttemptRecord {
            adapter_name: link.name().to_string(),
            outcome: outcome.clone(),
            elapsed,
        });

        outcome
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn log_attempt(adapter: &str, attempt: usize, outcome: &AdapterOutcome, elapsed: Duration) {
    match outcome {
        AdapterOutcome::Success { external_reference } => tracing::info!(
            event.action = event::action::DELIVERY_ATTEMPTED,
            adapter,
            attempt,
            outcome = outcome.label(),
            external_reference = external_reference.as_deref(),
            elapsed_ms = millis(elapsed),
            "配信試行成功"
        ),
        AdapterOutcome::Failure {
            kind,
            reason,
            retriable,
        } => tracing::warn!(
            event.action = event::action::DELIVERY_ATTEMPTED,
            error.category = error::category::EXTERNAL_SERVICE,
            error.kind = error::kind::PROVIDER,
            adapter,
            attempt,
            outcome = outcome.label(),
            failure_kind = %kind,
            retriable,
            reason = %reason,
            elapsed_ms = millis(elapsed),
            "配信試行失敗、次のアダプタへ"
        ),
        AdapterOutcome::TimedOut => tracing::warn!(
            event.action = event::action::DELIVERY_ATTEMPTED,
            error.category = error::category::EXTERNAL_SERVICE,
            error.kind = error::kind::PROVIDER,
            adapter,
            attempt,
            outcome = outcome.label(),
            retriable = true,
            elapsed_ms = millis(elapsed),
            "配信試行タイムアウト、次のアダプタへ"
        ),
    }
}

fn log_record(record: &DeliveryRecord) {
    let status: &'static str = record.status().into();
    let (action, result) = if record.is_degraded() {
        (event::action::DELIVERY_DEGRADED, event::result::DEGRADED)
    } else {
        (event::action::DELIVERY_COMPLETED, event::result::SUCCESS)
    };
    let adapter = record
        .successful_attempt()
        .map(|attempt| attempt.adapter_name.as_str());

    log_business_event!(
        event.category = event::category::DELIVERY,
        event.action = action,
        event.entity_type = event::entity_type::DELIVERY_RECORD,
        event.entity_id = %record.correlation_id(),
        event.result = result,
        delivery.class = %record.class(),
        delivery.status = status,
        delivery.adapter = adapter,
        delivery.attempts = record.attempts().len(),
        delivery.cancelled = record.cancelled(),
        delivery.total_elapsed_ms = millis(record.total_elapsed()),
        "配信完了"
    );

    if record.is_degraded() {
        tracing::warn!(
            error.category = error::category::EXTERNAL_SERVICE,
            error.kind = error::kind::TERMINAL_DEGRADED,
            correlation_id = %record.correlation_id(),
            class = %record.class(),
            attempts = record.attempts().len(),
            "実プロバイダに届かず終端ログへの記録のみ"
        );
    }
}

#[cfg(test)]
mod tests {
    use cascade_domain::{
        clock::FixedClock,
        delivery::{DeliveryClass, EmailMessage, FailureKind},
    };
    use cascade_infra::mock::{Behavior, ScriptedAdapter};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    const DEADLINE: Duration = Duration::from_secs(5);

    fn executor() -> FallbackExecutor {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        FallbackExecutor::new(Arc::new(FixedClock::new(now)))
    }

    fn email_request() -> DeliveryRequest {
        DeliveryRequest::new(
            EmailMessage {
                to:        "studio@example.com".to_string(),
                subject:   "[Cascade] 新しい見積もり依頼".to_string(),
                html_body: "<p>本文</p>".to_string(),
                text_body: "本文".to_string(),
                reply_to:  None,
            }
            .into(),
        )
    }

    fn terminal() -> Arc<ScriptedAdapter> {
        Arc::new(ScriptedAdapter::new("terminal-log").terminal())
    }

    #[tokio::test(start_paused = true)]
    async fn test_先頭のアダプタが成功すればdelivered() {
        let first = Arc::new(ScriptedAdapter::succeeding("resend"));
        let second = Arc::new(ScriptedAdapter::succeeding("ses"));
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(first.clone(), DEADLINE)
            .link(second.clone(), DEADLINE)
            .terminal(terminal(), DEADLINE)
            .build();

        let record = executor().deliver(email_request(), &chain).await;

        assert_eq!(record.status(), DeliveryStatus::Delivered);
        assert_eq!(record.attempts().len(), 1);
        assert_eq!(second.call_count(), 0);
        assert!(!record.cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_2番目以降の成功はdelivered_via_fallback() {
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(
                Arc::new(ScriptedAdapter::failing("resend", AdapterOutcome::transient("503"))),
                DEADLINE,
            )
            .link(
                Arc::new(ScriptedAdapter::failing("ses", AdapterOutcome::rejected("bad"))),
                DEADLINE,
            )
            .link(Arc::new(ScriptedAdapter::succeeding("smtp:mail.example.com:465")), DEADLINE)
            .terminal(terminal(), DEADLINE)
            .build();

        let record = executor().deliver(email_request(), &chain).await;

        assert_eq!(record.status(), DeliveryStatus::DeliveredViaFallback);
        let names: Vec<&str> = record
            .attempts()
            .iter()
            .map(|a| a.adapter_name.as_str())
            .collect();
        assert_eq!(names, vec!["resend", "ses", "smtp:mail.example.com:465"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_実アダプタがすべて失敗すれば終端シンクでlogged_only() {
        let sink = terminal();
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(
                Arc::new(ScriptedAdapter::failing("resend", AdapterOutcome::misconfigured("no key"))),
                DEADLINE,
            )
            .terminal(sink.clone(), DEADLINE)
            .build();
        let sut = executor();

        let record = sut.deliver(email_request(), &chain).await;

        assert_eq!(record.status(), DeliveryStatus::LoggedOnly);
        assert_eq!(sink.call_count(), 1);
        assert_eq!(record.attempts().last().unwrap().adapter_name, "terminal-log");
        assert!(sut.synthetic_terminal().entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_終端シンクがなければ合成終端ログに記録する() {
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(
                Arc::new(ScriptedAdapter::failing("resend", AdapterOutcome::transient("down"))),
                DEADLINE,
            )
            .build();
        let sut = executor();

        let record = sut.deliver(email_request(), &chain).await;

        assert_eq!(record.status(), DeliveryStatus::LoggedOnly);
        assert_eq!(record.attempts().len(), 2);
        assert_eq!(record.attempts()[1].adapter_name, SYNTHETIC_TERMINAL_NAME);
        assert_eq!(sut.synthetic_terminal().entries().len(), 1);
        assert_eq!(
            record.final_reference(),
            Some(sut.synthetic_terminal().entries()[0].reference().as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_終端シンク自体が失敗しても合成終端ログでlogged_only() {
        let broken_sink = Arc::new(
            ScriptedAdapter::failing("terminal-log", AdapterOutcome::transient("disk full"))
                .terminal(),
        );
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .terminal(broken_sink, DEADLINE)
            .build();
        let sut = executor();

        let record = sut.deliver(email_request(), &chain).await;

        assert_eq!(record.status(), DeliveryStatus::LoggedOnly);
        let names: Vec<&str> = record
            .attempts()
            .iter()
            .map(|a| a.adapter_name.as_str())
            .collect();
        assert_eq!(names, vec!["terminal-log", SYNTHETIC_TERMINAL_NAME]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_パニックするアダプタでもチェーンは進む() {
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(Arc::new(ScriptedAdapter::new("broken").then(Behavior::Panic)), DEADLINE)
            .link(Arc::new(ScriptedAdapter::succeeding("ses")), DEADLINE)
            .build();

        let record = executor().deliver(email_request(), &chain).await;

        assert_eq!(record.status(), DeliveryStatus::DeliveredViaFallback);
        assert_eq!(
            record.attempts()[0].outcome.failure_kind(),
            Some(FailureKind::Transient)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_待ち時間が0のチェーンは試行間で待たない() {
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(
                Arc::new(ScriptedAdapter::failing("resend", AdapterOutcome::transient("down"))),
                DEADLINE,
            )
            .link(Arc::new(ScriptedAdapter::succeeding("ses")), DEADLINE)
            .build();
        let started = Instant::now();

        executor().deliver(email_request(), &chain).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_記録の完了時刻は時計から取る() {
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(Arc::new(ScriptedAdapter::succeeding("resend")), DEADLINE)
            .build();

        let record = executor().deliver(email_request(), &chain).await;

        assert_eq!(
            record.completed_at(),
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_開始前にキャンセル済みなら実アダプタを飛ばして終端シンクのみ() {
        let provider = Arc::new(ScriptedAdapter::succeeding("resend"));
        let sink = terminal();
        let chain = FallbackChain::builder(DeliveryClass::Email)
            .link(provider.clone(), DEADLINE)
            .terminal(sink.clone(), DEADLINE)
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let record = executor()
            .deliver_with_cancel(email_request(), &chain, &cancel)
            .await;

        assert_eq!(record.status(), DeliveryStatus::LoggedOnly);
        assert!(record.cancelled());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(sink.call_count(), 1);
    }
}

//! # 通知サービス
//!
//! テンプレートレンダリング → メールチェーンでの配信 → 配信レコード保存を統合するサービス。
//!
//! - **業務処理を止めない**: `notify()` はエラーを返さない。最悪でも `LoggedOnly` の記録が残る
//! - **テンプレート失敗でも配信する**: 要約テキストに差し替えて配信を続ける
//! - **依存性注入**: 実行器・チェーン・リポジトリは外から渡す

use std::sync::Arc;

use cascade_domain::{
    delivery::{DeliveryRecord, DeliveryRequest},
    notification::{QuotationNotification, QuotationSummary},
};
use cascade_infra::repository::DeliveryRecordRepository;
use cascade_shared::{
    event_log::{error, event},
    log_business_event,
};

use super::{TemplateRenderer, template_renderer};
use crate::{chain::FallbackChain, executor::FallbackExecutor, persist::persist_record};

/// 通知サービス
pub struct NotificationService {
    executor:          Arc<FallbackExecutor>,
    email_chain:       Arc<FallbackChain>,
    template_renderer: TemplateRenderer,
    record_repo:       Option<Arc<dyn DeliveryRecordRepository>>,
}

impl NotificationService {
    /// `record_repo` が `None` の場合、配信レコードは構造化ログにのみ残る
    pub fn new(
        executor: Arc<FallbackExecutor>,
        email_chain: Arc<FallbackChain>,
        template_renderer: TemplateRenderer,
        record_repo: Option<Arc<dyn DeliveryRecordRepository>>,
    ) -> Self {
        Self {
            executor,
            email_chain,
            template_renderer,
            record_repo,
        }
    }

    /// 通知を 1 件配信する
    pub async fn notify(&self, notification: QuotationNotification) -> DeliveryRecord {
        let kind: &'static str = notification.kind().into();
        let quotation_id = notification.quotation().quotation_id.clone();

        let email = match self.template_renderer.render(&notification) {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::TEMPLATE,
                    notification.kind = kind,
                    "通知テンプレートのレンダリングに失敗、要約テキストで配信: {}",
                    e
                );
                template_renderer::fallback_message(&notification)
            }
        };

        let request = DeliveryRequest::new(email.into());
        let correlation_id = request.correlation_id().clone();
        let record = self.executor.deliver(request, &self.email_chain).await;

        let result = if record.is_degraded() {
            event::result::DEGRADED
        } else {
            event::result::SUCCESS
        };
        log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_DISPATCHED,
            event.entity_type = event::entity_type::QUOTATION,
            event.entity_id = %quotation_id,
            event.result = result,
            notification.kind = kind,
            notification.correlation_id = %correlation_id,
            notification.status = %record.status(),
            "見積もり通知の配信完了"
        );

        persist_record(self.record_repo.as_deref(), &record).await;
        record
    }

    /// 見積もり依頼の受付時に、スタジオ宛・顧客宛の 2 通を順に配信する
    pub async fn notify_quotation_received(
        &self,
        quotation: QuotationSummary,
        studio_email: impl Into<String>,
    ) -> Vec<DeliveryRecord> {
        let studio_alert = QuotationNotification::StudioAlert {
            quotation:    quotation.clone(),
            studio_email: studio_email.into(),
        };
        let confirmation = QuotationNotification::CustomerConfirmation { quotation };

        vec![
            self.notify(studio_alert).await,
            self.notify(confirmation).await,
        ]
    }
}

//! # 参考画像アップロードユースケース
//!
//! 見積もり依頼に添付された画像を 1 枚ずつアセットチェーンで配信し、
//! 保存先 URL を入力順に返す。
//!
//! 実プロバイダに届かなかった画像（`LoggedOnly`）は URL 一覧から省く（詰める）。
//! どの画像が落ちたかは [`AssetUploadReport::items`] で確認できる。

use std::sync::Arc;

use cascade_domain::delivery::{AssetPayload, DeliveryRecord, DeliveryRequest, DeliveryStatus};
use cascade_infra::repository::DeliveryRecordRepository;
use cascade_shared::{event_log::event, log_business_event};
use serde::Serialize;

use crate::{chain::FallbackChain, executor::FallbackExecutor, persist::persist_record};

/// 画像 1 枚分の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetUploadItem {
    /// 入力順の位置（0 始まり）
    pub index:  usize,
    pub status: DeliveryStatus,
    /// 実プロバイダに保存できた場合の URL
    pub url:    Option<String>,
}

/// 一括アップロードの結果
#[derive(Debug, Clone)]
pub struct AssetUploadReport {
    records: Vec<DeliveryRecord>,
}

impl AssetUploadReport {
    /// 保存できた画像の URL（入力順、失敗分は詰める）
    pub fn urls(&self) -> Vec<String> {
        self.items().into_iter().filter_map(|item| item.url).collect()
    }

    /// 画像ごとの結果
    pub fn items(&self) -> Vec<AssetUploadItem> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| AssetUploadItem {
                index,
                status: record.status(),
                url: if record.status().is_delivered() {
                    record.final_reference().map(str::to_string)
                } else {
                    None
                },
            })
            .collect()
    }

    /// 画像ごとの配信レコード（入力順）
    pub fn records(&self) -> &[DeliveryRecord] {
        &self.records
    }

    /// 終端シンクにしか残らなかった画像の数
    pub fn degraded_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_degraded()).count()
    }

    /// 実プロバイダに届いたが URL が返らなかった画像の数
    pub fn missing_url_count(&self) -> usize {
        self.records.iter().filter(|r| delivered_without_url(r)).count()
    }
}

fn delivered_without_url(record: &DeliveryRecord) -> bool {
    record.status().is_delivered() && record.final_reference().is_none()
}

/// 参考画像アップロードサービス
pub struct AssetUploadService {
    executor:    Arc<FallbackExecutor>,
    asset_chain: Arc<FallbackChain>,
    record_repo: Option<Arc<dyn DeliveryRecordRepository>>,
}

impl AssetUploadService {
    pub fn new(
        executor: Arc<FallbackExecutor>,
        asset_chain: Arc<FallbackChain>,
        record_repo: Option<Arc<dyn DeliveryRecordRepository>>,
    ) -> Self {
        Self {
            executor,
            asset_chain,
            record_repo,
        }
    }

    /// 画像を入力順に 1 枚ずつアップロードする
    ///
    /// 画像間では待たない。待ち時間はチェーン内の試行間にだけ入る。
    pub async fn upload_all(&self, images: Vec<AssetPayload>) -> AssetUploadReport {
        let total = images.len();
        let mut records = Vec::with_capacity(total);

        for (index, image) in images.into_iter().enumerate() {
            let record = self
                .executor
                .deliver(DeliveryRequest::new(image.into()), &self.asset_chain)
                .await;
            if delivered_without_url(&record) {
                tracing::warn!(
                    index,
                    correlation_id = %record.correlation_id(),
                    adapter = record.successful_attempt().map(|a| a.adapter_name.as_str()),
                    "保存は成功したが URL が返らなかったため URL 一覧から除外"
                );
            }
            persist_record(self.record_repo.as_deref(), &record).await;
            records.push(record);
        }

        let report = AssetUploadReport { records };
        let degraded = report.degraded_count();
        let result = if degraded == 0 {
            event::result::SUCCESS
        } else {
            event::result::DEGRADED
        };
        log_business_event!(
            event.category = event::category::ASSET,
            event.action = event::action::ASSET_BATCH_UPLOADED,
            event.result = result,
            asset.total = total,
            asset.uploaded = total - degraded,
            asset.degraded = degraded,
            asset.missing_url = report.missing_url_count(),
            "参考画像のアップロード完了"
        );

        report
    }
}

//! 配信レコードの保存
//!
//! 保存先の障害は配信結果に影響させない。失敗はログに残して握りつぶす。

use cascade_domain::delivery::DeliveryRecord;
use cascade_infra::repository::DeliveryRecordRepository;
use cascade_shared::event_log::error;

pub(crate) async fn persist_record(
    repository: Option<&dyn DeliveryRecordRepository>,
    record: &DeliveryRecord,
) {
    let Some(repository) = repository else {
        return;
    };

    if let Err(e) = repository.insert(record).await {
        tracing::error!(
            error.category = error::category::INFRASTRUCTURE,
            error.kind = error::kind::DATABASE,
            correlation_id = %record.correlation_id(),
            status = %record.status(),
            "配信レコードの保存に失敗: {}",
            e
        );
    }
}

//! # DeliveryRecordRepository
//!
//! 配信レコード（全試行の記録と最終ステータス）の永続化を担当するリポジトリ。
//!
//! - **追記のみ**: レコードは不変。INSERT だけを提供する
//! - **試行は JSONB**: アダプタ名・結果・所要時間を配列のまま保存する
//! - **失敗は呼び出し側でログに留める**: 永続化の失敗で配信結果は変わらない

use async_trait::async_trait;
use cascade_domain::delivery::DeliveryRecord;
use sqlx::{PgPool, types::Json};

use crate::error::InfraError;

/// 配信レコードリポジトリトレイト
#[async_trait]
pub trait DeliveryRecordRepository: Send + Sync {
    /// 配信レコードを挿入する
    async fn insert(&self, record: &DeliveryRecord) -> Result<(), InfraError>;
}

/// PostgreSQL 実装の DeliveryRecordRepository
#[derive(Debug, Clone)]
pub struct PostgresDeliveryRecordRepository {
    pool: PgPool,
}

impl PostgresDeliveryRecordRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryRecordRepository for PostgresDeliveryRecordRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(correlation_id = %record.correlation_id()))]
    async fn insert(&self, record: &DeliveryRecord) -> Result<(), InfraError> {
        let total_elapsed_ms =
            i64::try_from(record.total_elapsed().as_millis()).unwrap_or(i64::MAX);
        let class: &'static str = record.class().into();
        let status: &'static str = record.status().into();

        sqlx::query(
            r#"
            INSERT INTO delivery_records (
                correlation_id, class, status, cancelled,
                attempts, final_reference, total_elapsed_ms, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.correlation_id().as_uuid())
        .bind(class)
        .bind(status)
        .bind(record.cancelled())
        .bind(Json(record.attempts()))
        .bind(record.final_reference())
        .bind(total_elapsed_ms)
        .bind(record.completed_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

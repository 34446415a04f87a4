//! S3 / MinIO 統合テスト
//!
//! MinIO を使用した S3StorageAdapter のアップロードと失敗分類の統合テスト。
//!
//! 実行方法:
//! ```bash
//! docker run -p 19000:9000 minio/minio server /data
//! cargo test -p cascade-infra --test s3_test -- --ignored
//! ```

use std::time::Duration;

use cascade_domain::delivery::{AdapterOutcome, AssetPayload, DeliveryRequest, FailureKind};
use cascade_infra::{
    DeliveryAdapter,
    storage::{S3StorageAdapter, s3},
};

const DEADLINE: Duration = Duration::from_secs(10);

/// テスト用の S3（MinIO）エンドポイント
///
/// 優先順位:
/// 1. `S3_ENDPOINT_URL`（CI で明示的に設定）
/// 2. `MINIO_API_PORT` から構築
/// 3. フォールバック: `http://localhost:19000`
fn s3_endpoint() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| {
        let port = std::env::var("MINIO_API_PORT").unwrap_or_else(|_| "19000".to_string());
        format!("http://localhost:{port}")
    })
}

/// テスト用のバケット名
fn s3_bucket() -> String {
    std::env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "cascade-dev-assets".to_string())
}

/// テストごとに一意な S3 キーを生成する（UUID v7 で分離）
fn test_s3_key(prefix: &str) -> String {
    format!("test/{prefix}/{}.txt", uuid::Uuid::now_v7())
}

async fn create_test_adapter(bucket: &str) -> S3StorageAdapter {
    let endpoint = s3_endpoint();
    let client = s3::create_client(Some(&endpoint), "us-east-1", DEADLINE).await;
    let url_prefix = s3::object_url_prefix(bucket, Some(&endpoint), "us-east-1", None);
    S3StorageAdapter::new(client, bucket, url_prefix)
}

fn asset_request(key: &str) -> DeliveryRequest {
    DeliveryRequest::new(AssetPayload::new(b"Hello, MinIO!".to_vec(), "text/plain", key).into())
}

#[tokio::test]
#[ignore = "MinIO が必要（S3_ENDPOINT_URL）"]
async fn test_minioにアップロードしてurlを返す() {
    let bucket = s3_bucket();
    let sut = create_test_adapter(&bucket).await;
    let key = test_s3_key("upload");

    let outcome = sut.attempt(&asset_request(&key), DEADLINE).await;

    let expected = format!("{}/{bucket}/{key}", s3_endpoint());
    assert_eq!(outcome, AdapterOutcome::success_with(expected));
}

#[tokio::test]
#[ignore = "MinIO が必要（S3_ENDPOINT_URL）"]
async fn test_存在しないバケットはmisconfigured() {
    let sut = create_test_adapter("cascade-no-such-bucket").await;

    let outcome = sut.attempt(&asset_request(&test_s3_key("missing")), DEADLINE).await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Misconfigured));
}

#[tokio::test]
async fn test_到達できないエンドポイントは失敗として返る() {
    let client = s3::create_client(Some("http://127.0.0.1:1"), "us-east-1", DEADLINE).await;
    let sut = S3StorageAdapter::new(client, "bucket-a", "http://127.0.0.1:1/bucket-a");

    let outcome = sut.attempt(&asset_request("test/unreachable.txt"), DEADLINE).await;

    assert!(!outcome.is_success());
}

//! # S3 互換バケットへのアップロード
//!
//! Amazon S3 / MinIO / R2 などの S3 互換ストレージにアセットを PUT し、
//! 公開 URL を外部参照として返す。
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use cascade_infra::storage::s3;
//! use std::time::Duration;
//!
//! async fn setup() {
//!     // ローカル（MinIO）
//!     let client = s3::create_client(Some("http://localhost:19000"), "ap-northeast-1", Duration::from_secs(30)).await;
//!     let prefix = s3::object_url_prefix("cascade-dev-assets", Some("http://localhost:19000"), "ap-northeast-1", None);
//!     let adapter = s3::S3StorageAdapter::new(client, "cascade-dev-assets", prefix);
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::http::HttpResponse,
    error::{ProvideErrorMetadata, SdkError},
    operation::put_object::PutObjectError,
    primitives::ByteStream,
};
use cascade_domain::delivery::{AdapterOutcome, DeliveryClass, DeliveryRequest};

use crate::adapter::{DeliveryAdapter, class_mismatch};

/// S3 互換バケットへのアップロード
pub struct S3StorageAdapter {
    name:       String,
    client:     Client,
    bucket:     String,
    url_prefix: String,
}

impl S3StorageAdapter {
    /// 新しいバケットアダプタを作成する
    ///
    /// アダプタ名は `s3:{bucket}` になる。`url_prefix` は [`object_url_prefix`] で求める。
    pub fn new(client: Client, bucket: impl Into<String>, url_prefix: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            name: format!("s3:{bucket}"),
            client,
            bucket,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix, key.trim_start_matches('/'))
    }
}

/// オブジェクト URL のプレフィックスを求める
///
/// 優先順位:
/// 1. `public_base_url`（CDN 等の公開 URL）
/// 2. カスタムエンドポイント（パススタイル: `{endpoint}/{bucket}`）
/// 3. AWS S3 の仮想ホスト形式（`https://{bucket}.s3.{region}.amazonaws.com`）
pub fn object_url_prefix(
    bucket: &str,
    endpoint: Option<&str>,
    region: &str,
    public_base_url: Option<&str>,
) -> String {
    if let Some(base) = public_base_url.filter(|b| !b.trim().is_empty()) {
        return base.trim_end_matches('/').to_string();
    }
    if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
        return format!("{}/{bucket}", endpoint.trim_end_matches('/'));
    }
    format!("https://{bucket}.s3.{region}.amazonaws.com")
}

/// HTTP ステータスコードを失敗分類に変換する
pub(crate) fn classify_status(status: u16, reason: String) -> AdapterOutcome {
    match status {
        429 | 503 => AdapterOutcome::rate_limited(reason),
        401 | 403 | 404 => AdapterOutcome::misconfigured(reason),
        408 => AdapterOutcome::transient(reason),
        400..=499 => AdapterOutcome::rejected(reason),
        _ => AdapterOutcome::transient(reason),
    }
}

/// PUT Object のエラーを失敗分類に変換する
fn classify_error(err: &SdkError<PutObjectError, HttpResponse>) -> AdapterOutcome {
    match err {
        SdkError::TimeoutError(_) => return AdapterOutcome::TimedOut,
        SdkError::DispatchFailure(dispatch) if dispatch.is_timeout() => {
            return AdapterOutcome::TimedOut;
        }
        SdkError::ConstructionFailure(_) => {
            return AdapterOutcome::misconfigured(format!("S3 リクエスト構築失敗: {err:?}"));
        }
        _ => {}
    }

    let code = err.as_service_error().and_then(|e| e.code());
    let reason = match code {
        Some(code) => format!("S3 アップロード失敗: {code}"),
        None => format!("S3 アップロード失敗: {err:?}"),
    };
    match code {
        Some("SlowDown") => return AdapterOutcome::rate_limited(reason),
        Some("AccessDenied" | "NoSuchBucket" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
            return AdapterOutcome::misconfigured(reason);
        }
        _ => {}
    }

    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(status) => classify_status(status, reason),
        None => AdapterOutcome::transient(reason),
    }
}

#[async_trait]
impl DeliveryAdapter for S3StorageAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(adapter = %self.name, correlation_id = %request.correlation_id())
    )]
    async fn attempt(&self, request: &DeliveryRequest, _deadline: Duration) -> AdapterOutcome {
        let Some(asset) = request.as_asset() else {
            return class_mismatch(&self.name, DeliveryClass::AssetUpload, request);
        };
        if asset.content.is_empty() {
            return AdapterOutcome::misconfigured("アセットの内容が空");
        }
        let key = asset.target_path.trim_start_matches('/');
        if key.is_empty() {
            return AdapterOutcome::misconfigured("保存先パスが空");
        }

        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&asset.content_type)
            .body(ByteStream::from(asset.content.clone()))
            .send()
            .await;

        match result {
            Ok(_) => AdapterOutcome::success_with(self.object_url(key)),
            Err(err) => classify_error(&err),
        }
    }
}

/// S3 クライアントを作成する
///
/// `endpoint` が `Some` の場合は MinIO 等のカスタムエンドポイントに接続する。
/// 認証情報は SDK のデフォルト認証チェーンで解決する。
/// `operation_timeout` にはアップロードの期限を渡す。
pub async fn create_client(
    endpoint: Option<&str>,
    region: &str,
    operation_timeout: Duration,
) -> Client {
    let mut config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .timeout_config(
            aws_config::timeout::TimeoutConfig::builder()
                .operation_timeout(operation_timeout)
                .build(),
        );

    if let Some(endpoint_url) = endpoint {
        config_builder = config_builder.endpoint_url(endpoint_url);
    }

    let config = config_builder.load().await;

    // MinIO はパススタイルが必要（エンドポイント指定時のみ）
    let s3_config_builder = aws_sdk_s3::config::Builder::from(&config);
    let s3_config = if endpoint.is_some() {
        s3_config_builder.force_path_style(true).build()
    } else {
        s3_config_builder.build()
    };

    Client::from_conf(s3_config)
}

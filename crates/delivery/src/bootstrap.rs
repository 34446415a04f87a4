//! # 起動時の組み立て
//!
//! [`DeliveryConfig`] からアダプタを生成し、配信クラスごとのチェーンと
//! ユースケースのサービスを組み立てる。
//!
//! チェーンの並び順:
//!
//! - メール: HTTP API → SES → SMTP（ポートの列挙順）→ 終端ログ
//! - アセット: バケット（列挙順）→ ローカルディスク
//!
//! クライアントはここで 1 度だけ生成し、以後は読み取り専用で共有する。

use std::{sync::Arc, time::Duration};

use cascade_domain::{
    clock::SystemClock,
    delivery::DeliveryClass,
    notification::NotificationError,
};
use cascade_infra::{
    DeliveryAdapter,
    InfraError,
    TerminalLogAdapter,
    db,
    notification::{
        SesEmailAdapter,
        SmtpEmailAdapter,
        SmtpSecurity,
        SmtpSettings,
        TransactionalApiAdapter,
        TransactionalApiConfig,
        ses,
    },
    repository::{DeliveryRecordRepository, PostgresDeliveryRecordRepository},
    storage::{LocalDiskSink, S3StorageAdapter, s3},
};
use thiserror::Error;

use crate::{
    asset::AssetUploadService,
    chain::{DeliveryChains, FallbackChain},
    config::{AssetConfig, DeliveryConfig, EmailConfig},
    executor::FallbackExecutor,
    notification::{NotificationService, TemplateRenderer},
};

/// メール終端ログのアダプタ名
pub const EMAIL_TERMINAL_NAME: &str = "terminal-log";

/// 終端シンクの期限（ローカル I/O のみ）
const TERMINAL_DEADLINE: Duration = Duration::from_secs(5);

/// 起動エラー
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("配信レコードの保存先を準備できません: {0}")]
    Database(#[from] InfraError),

    #[error("通知テンプレートを読み込めません: {0}")]
    Template(#[from] NotificationError),
}

/// 組み立て済みのサービス一式
pub struct DeliveryServices {
    pub chains:       DeliveryChains,
    pub executor:     Arc<FallbackExecutor>,
    pub notification: NotificationService,
    pub asset_upload: AssetUploadService,
    pub record_repo:  Option<Arc<dyn DeliveryRecordRepository>>,
}

/// 設定からサービス一式を組み立てる
///
/// データベースは `DATABASE_URL` 設定時のみ接続し、マイグレーションを適用する。
pub async fn build(config: &DeliveryConfig) -> Result<DeliveryServices, BootstrapError> {
    let record_repo = build_record_repository(config).await?;
    let chains = build_chains(config).await;
    let executor = Arc::new(FallbackExecutor::new(Arc::new(SystemClock)));

    let notification = NotificationService::new(
        executor.clone(),
        chains.email.clone(),
        TemplateRenderer::new()?,
        record_repo.clone(),
    );
    let asset_upload = AssetUploadService::new(
        executor.clone(),
        chains.asset_upload.clone(),
        record_repo.clone(),
    );

    Ok(DeliveryServices {
        chains,
        executor,
        notification,
        asset_upload,
        record_repo,
    })
}

/// 配信レコードリポジトリを準備する（未設定なら `None`）
pub async fn build_record_repository(
    config: &DeliveryConfig,
) -> Result<Option<Arc<dyn DeliveryRecordRepository>>, InfraError> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL が未設定のため配信レコードは構造化ログのみに残す");
        return Ok(None);
    };

    let pool = db::create_pool(database_url).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("配信レコードの保存先に接続しました");

    Ok(Some(Arc::new(PostgresDeliveryRecordRepository::new(pool))))
}

/// 配信クラスごとのチェーンを組み立てる
pub async fn build_chains(config: &DeliveryConfig) -> DeliveryChains {
    let chains = DeliveryChains {
        email:        Arc::new(build_email_chain(&config.email).await),
        asset_upload: Arc::new(build_asset_chain(&config.asset).await),
    };
    tracing::info!(
        email = ?chains.email.adapter_names(),
        asset_upload = ?chains.asset_upload.adapter_names(),
        "配信チェーンを組み立てました"
    );
    chains
}

/// メール配信チェーン
pub async fn build_email_chain(config: &EmailConfig) -> FallbackChain {
    let mut builder = FallbackChain::builder(DeliveryClass::Email);

    if let Some(api) = &config.api {
        let adapter = TransactionalApiAdapter::new(
            reqwest::Client::new(),
            TransactionalApiConfig {
                name:         api.name.clone(),
                base_url:     api.base_url.clone(),
                api_key:      api.api_key.clone(),
                from_address: config.from_address.clone(),
            },
        );
        builder = builder.link(Arc::new(adapter), api.timeout);
    }

    if let Some(ses_config) = &config.ses {
        let client = ses::create_client(&ses_config.region, ses_config.timeout).await;
        let adapter = SesEmailAdapter::new(client, config.from_address.clone());
        builder = builder.link(Arc::new(adapter), ses_config.timeout);
    }

    if let Some(smtp) = &config.smtp {
        for &port in &smtp.ports {
            let adapter = SmtpEmailAdapter::new(SmtpSettings {
                host:         smtp.host.clone(),
                port,
                security:     SmtpSecurity::for_port(port),
                credentials:  smtp.credentials.clone(),
                from_address: config.from_address.clone(),
                timeout:      smtp.timeout,
            });
            builder = builder.link(Arc::new(adapter), smtp.timeout);
        }
    }

    let terminal: Arc<dyn DeliveryAdapter> = Arc::new(TerminalLogAdapter::new(
        EMAIL_TERMINAL_NAME,
        config.terminal_log_path.clone(),
    ));

    builder.terminal(terminal, TERMINAL_DEADLINE).build()
}

/// アセットアップロードチェーン
pub async fn build_asset_chain(config: &AssetConfig) -> FallbackChain {
    let mut builder = FallbackChain::builder(DeliveryClass::AssetUpload)
        .inter_attempt_pause(config.pause);

    if !config.buckets.is_empty() {
        let endpoint = config.endpoint_url.as_deref();
        let client = s3::create_client(endpoint, &config.region, config.upload_timeout).await;

        for bucket in &config.buckets {
            let url_prefix = s3::object_url_prefix(
                bucket,
                endpoint,
                &config.region,
                config.public_base_url.as_deref(),
            );
            let adapter = S3StorageAdapter::new(client.clone(), bucket.clone(), url_prefix);
            builder = builder.link(Arc::new(adapter), config.upload_timeout);
        }
    }

    builder
        .terminal(
            Arc::new(LocalDiskSink::new(config.fallback_dir.clone())),
            TERMINAL_DEADLINE,
        )
        .build()
}

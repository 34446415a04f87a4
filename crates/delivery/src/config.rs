//! # 配信設定
//!
//! 環境変数から配信チェーンの設定を読み込む。
//!
//! 空文字の環境変数は未設定として扱う。プロバイダの設定が欠けていても
//! 起動は止めず、そのプロバイダをチェーンに並べないだけにする。
//! 値の形式が不正な場合のみ [`ConfigError`] を返す。

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

const DEFAULT_REGION: &str = "ap-northeast-1";
const DEFAULT_API_NAME: &str = "resend";
const DEFAULT_SMTP_PORTS: &str = "465,587";
const DEFAULT_FALLBACK_DIR: &str = "./data/uploads";

/// 設定読み込みエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("環境変数 {0} が設定されていません")]
    Missing(&'static str),

    /// 値の形式が不正
    #[error("環境変数 {name} の値が不正です: {value}（{reason}）")]
    Invalid {
        name:   &'static str,
        value:  String,
        reason: &'static str,
    },
}

/// 配信全体の設定
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// メール配信チェーン
    pub email:        EmailConfig,
    /// アセットアップロードチェーン
    pub asset:        AssetConfig,
    /// 配信レコードの保存先（未設定なら構造化ログのみ）
    pub database_url: Option<String>,
}

/// メール配信チェーンの設定
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// 送信元メールアドレス（全プロバイダ共通）
    pub from_address:      String,
    /// トランザクションメール API（`EMAIL_API_URL` 設定時のみ）
    pub api:               Option<ApiProviderConfig>,
    /// Amazon SES（`SES_ENABLED=true` のときのみ）
    pub ses:               Option<SesProviderConfig>,
    /// SMTP（`SMTP_HOST` 設定時のみ）
    pub smtp:              Option<SmtpProviderConfig>,
    /// 終端ログの JSON Lines 出力先（未設定なら構造化ログとメモリのみ）
    pub terminal_log_path: Option<PathBuf>,
}

/// トランザクションメール API の設定
#[derive(Clone)]
pub struct ApiProviderConfig {
    pub name:     String,
    pub base_url: String,
    pub api_key:  Option<String>,
    pub timeout:  Duration,
}

impl std::fmt::Debug for ApiProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// SES の設定
#[derive(Debug, Clone)]
pub struct SesProviderConfig {
    pub region:  String,
    pub timeout: Duration,
}

/// SMTP の設定
///
/// ポートごとに 1 アダプタを作り、列挙順にチェーンへ並べる。
#[derive(Clone)]
pub struct SmtpProviderConfig {
    pub host:        String,
    pub ports:       Vec<u16>,
    pub credentials: Option<(String, String)>,
    pub timeout:     Duration,
}

impl std::fmt::Debug for SmtpProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpProviderConfig")
            .field("host", &self.host)
            .field("ports", &self.ports)
            .field("credentials", &self.credentials.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// アセットアップロードチェーンの設定
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// バケット名（列挙順に試行する）
    pub buckets:         Vec<String>,
    /// S3 互換エンドポイント（MinIO 等。未設定で AWS S3）
    pub endpoint_url:    Option<String>,
    pub region:          String,
    /// 公開 URL のベース（CDN 等）
    pub public_base_url: Option<String>,
    /// 1 回のアップロードの期限
    pub upload_timeout:  Duration,
    /// 試行間の待ち時間
    pub pause:           Duration,
    /// 終端シンク（ローカルディスク）の保存先
    pub fallback_dir:    PathBuf,
}

impl DeliveryConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の参照関数から設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);

        Ok(Self {
            email:        EmailConfig::load(&env)?,
            asset:        AssetConfig::load(&env)?,
            database_url: env.get("DATABASE_URL"),
        })
    }
}

impl EmailConfig {
    fn load<F: Fn(&str) -> Option<String>>(env: &Lookup<F>) -> Result<Self, ConfigError> {
        let from_address = env.require("EMAIL_FROM_ADDRESS")?;
        let api_timeout = env.secs("EMAIL_API_TIMEOUT_SECS", 15)?;

        let api = env.get("EMAIL_API_URL").map(|base_url| ApiProviderConfig {
            name: env
                .get("EMAIL_API_NAME")
                .unwrap_or_else(|| DEFAULT_API_NAME.to_string()),
            base_url,
            api_key: env.get("EMAIL_API_KEY"),
            timeout: api_timeout,
        });

        let ses = if env.flag("SES_ENABLED")? {
            Some(SesProviderConfig {
                region:  env
                    .get("SES_REGION")
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                timeout: api_timeout,
            })
        } else {
            None
        };

        let smtp = match env.get("SMTP_HOST") {
            Some(host) => Some(SmtpProviderConfig {
                host,
                ports: parse_ports(
                    &env.get("SMTP_PORTS")
                        .unwrap_or_else(|| DEFAULT_SMTP_PORTS.to_string()),
                )?,
                credentials: env.get("SMTP_USERNAME").zip(env.get("SMTP_PASSWORD")),
                timeout: env.secs("SMTP_TIMEOUT_SECS", 15)?,
            }),
            None => None,
        };

        Ok(Self {
            from_address,
            api,
            ses,
            smtp,
            terminal_log_path: env.get("EMAIL_TERMINAL_LOG_PATH").map(PathBuf::from),
        })
    }
}

impl AssetConfig {
    fn load<F: Fn(&str) -> Option<String>>(env: &Lookup<F>) -> Result<Self, ConfigError> {
        let buckets = env
            .get("ASSET_BUCKETS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            buckets,
            endpoint_url: env.get("S3_ENDPOINT_URL"),
            region: env
                .get("S3_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            public_base_url: env.get("ASSET_PUBLIC_BASE_URL"),
            upload_timeout: env.secs("ASSET_UPLOAD_TIMEOUT_SECS", 30)?,
            pause: Duration::from_millis(env.parse("ASSET_UPLOAD_PAUSE_MS", 500)?),
            fallback_dir: env
                .get("ASSET_FALLBACK_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_FALLBACK_DIR), PathBuf::from),
        })
    }
}

/// 環境変数の参照関数
struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name,
                value,
                reason: "数値である必要があります",
            }),
        }
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs = self.parse(name, default)?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                name,
                value: secs.to_string(),
                reason: "1 以上である必要があります",
            });
        }
        Ok(Duration::from_secs(secs))
    }

    fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
        match self.get(name).map(|v| v.to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(false),
            Some(value) => Err(ConfigError::Invalid {
                name,
                value,
                reason: "true または false を指定してください",
            }),
        }
    }
}

fn parse_ports(list: &str) -> Result<Vec<u16>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        name:   "SMTP_PORTS",
        value:  list.to_string(),
        reason: "カンマ区切りのポート番号である必要があります",
    };

    let ports = list
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u16>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    if ports.is_empty() {
        return Err(invalid());
    }
    Ok(ports)
}

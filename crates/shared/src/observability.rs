//! # Observability 基盤
//!
//! 配信エンジンを組み込むプロセス向けのトレーシング初期化。
//!
//! 配信試行ログ・配信レコード・終端ログはすべて `tracing` のイベントとして出力され、
//! ここで登録した subscriber を通じて外部のログ集約基盤に流れる。
//!
//! | 環境変数 | 用途 | 既定値 |
//! |---|---|---|
//! | `LOG_FORMAT` | `json` / `pretty` / `compact` | `pretty` |
//! | `RUST_LOG` | フィルタ | `info,cascade=debug` |

use std::str::FromStr;

/// `RUST_LOG` 未設定時のフィルタ
pub const DEFAULT_FILTER: &str = "info,cascade=debug";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 1 行 1 JSON（ログ集約向け）。スパンのフィールドはトップレベルに展開する
    Json,
    /// 複数行の読みやすい形式
    #[default]
    Pretty,
    /// 1 行の簡潔な形式（ローカルでの配信シナリオ確認向け）
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown LOG_FORMAT={other:?}")),
        }
    }
}

impl LogFormat {
    /// 環境変数 `LOG_FORMAT` から読み取る
    ///
    /// subscriber 初期化前なので、不正値の警告は stderr に出して既定値を使う。
    pub fn from_env() -> Self {
        let Ok(value) = std::env::var("LOG_FORMAT") else {
            return Self::default();
        };
        value.parse().unwrap_or_else(|e| {
            eprintln!("WARNING: {e}, falling back to pretty");
            Self::default()
        })
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// 組み込み先プロセスの名前（全ログの `service` フィールド）
    pub service_name:   String,
    pub log_format:     LogFormat,
    /// `RUST_LOG` 未設定時に使うフィルタ
    pub default_filter: String,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name:   service_name.into(),
            log_format,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    /// `LOG_FORMAT` を環境変数から読む
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::new(service_name, LogFormat::from_env())
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// トレーシングを初期化する
///
/// `tracing_error::ErrorLayer` も登録し、インフラ層エラーの `SpanTrace` に
/// 配信スパン（相関 ID・配信クラス）が残るようにする。
/// 既に subscriber が登録済みなら何もしない。
///
/// 戻り値のスパンを保持している間、すべてのログに `service` が付く。
#[cfg(feature = "observability")]
pub fn init_tracing(config: TracingConfig) -> tracing::span::EnteredSpan {
    use tracing_subscriber::{Layer as _, fmt};

    let layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };
    install(layer, &config.default_filter);

    tracing::info_span!("app", service = %config.service_name).entered()
}

/// テスト用のトレーシング初期化
///
/// `cargo test` の出力キャプチャに乗るテストライターを使う。
/// 複数のテストから呼ばれてよい。
#[cfg(feature = "observability")]
pub fn init_test_tracing() {
    use tracing_subscriber::{Layer as _, fmt};

    install(fmt::layer().compact().with_test_writer().boxed(), "debug");
}

#[cfg(feature = "observability")]
fn install(
    layer: Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync>,
    default_filter: &str,
) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // 二重初期化はエラーになるだけなので無視する
    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .with(tracing_error::ErrorLayer::default())
        .try_init();
}

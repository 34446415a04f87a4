//! # 配信アダプタ
//!
//! 外部の配信・保存バックエンド 1 つを統一された試行契約の裏に包む。
//!
//! ## 契約
//!
//! - **1 回の呼び出しで外部呼び出しは 1 回**: アダプタ内部でリトライしない（リトライはチェーンの責務）
//! - **例外を出さない**: すべての失敗経路は [`AdapterOutcome::Failure`] か
//!   [`AdapterOutcome::TimedOut`] に解決する
//! - **リクエストに対して無状態**: 認証情報やクライアントは生成時に固定され、以後不変
//! - **期限の尊重**: トランスポートが協調キャンセルに対応していれば `deadline` をそこに渡す。
//!   対応していない場合はタイムアウトガードが外側から打ち切る
//! - **切り離し安全**: タイムアウト後もバックグラウンドで完了し得るため、
//!   共有状態を壊さないこと

use std::time::Duration;

use async_trait::async_trait;
use cascade_domain::delivery::{AdapterOutcome, DeliveryClass, DeliveryRequest};

/// 配信アダプタトレイト
///
/// メール API・SMTP 設定・バケットなど、アカウント / 宛先ごとに 1 インスタンスを
/// 起動時に生成し、`Arc<dyn DeliveryAdapter>` として共有する。
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    /// 試行記録・ログに使う名前（例: `"ses"`, `"s3:reference-images"`）
    fn name(&self) -> &str;

    /// 常に成功する終端シンクか
    fn is_terminal(&self) -> bool {
        false
    }

    /// 配信を 1 回試行する
    async fn attempt(&self, request: &DeliveryRequest, deadline: Duration) -> AdapterOutcome;
}

/// 配信クラスが一致しないリクエストを `Misconfigured` として返すためのヘルパー
///
/// メール用アダプタにアセットが渡されるのはチェーン構成の誤りであり、
/// プロバイダ呼び出しは行わない。
pub(crate) fn class_mismatch(
    adapter: &str,
    expected: DeliveryClass,
    request: &DeliveryRequest,
) -> AdapterOutcome {
    AdapterOutcome::misconfigured(format!(
        "{adapter} は {expected} 専用だが {} リクエストが渡された",
        request.class()
    ))
}

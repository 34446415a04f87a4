//! # ローカルディスク終端シンク
//!
//! すべてのバケットが失敗したアセットをローカルディスクに書き出す。
//! 書き込みにも失敗した場合はメモリ上の終端ログに退避し、常に `Success` を返す。

use std::{
    path::{Component, Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use cascade_domain::delivery::{AdapterOutcome, AssetPayload, DeliveryRequest};
use cascade_shared::event_log::error;

use crate::{adapter::DeliveryAdapter, error::InfraError, terminal::TerminalLogAdapter};

/// ローカルディスク終端シンク
pub struct LocalDiskSink {
    name:     String,
    base_dir: PathBuf,
    fallback: TerminalLogAdapter,
}

impl LocalDiskSink {
    /// `base_dir` 配下に書き込むシンクを作成する
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let name = "local-disk".to_string();
        Self {
            fallback: TerminalLogAdapter::in_memory(name.clone()),
            name,
            base_dir: base_dir.into(),
        }
    }

    /// 書き込みに失敗して退避した分のエントリ
    pub fn fallback(&self) -> &TerminalLogAdapter {
        &self.fallback
    }

    /// 保存先パス（`..` や絶対パスは取り除いて `base_dir` 配下に閉じ込める）
    pub fn resolve(&self, target_path: &str) -> PathBuf {
        self.base_dir.join(sanitize(target_path))
    }

    async fn write(&self, asset: &AssetPayload) -> Result<PathBuf, InfraError> {
        let path = self.resolve(&asset.target_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &asset.content).await?;

        Ok(path)
    }
}

/// パス区切りで分割し、通常の名前要素だけを残す
fn sanitize(target_path: &str) -> PathBuf {
    let relative: PathBuf = Path::new(&target_path.replace('\\', "/"))
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if relative.as_os_str().is_empty() {
        PathBuf::from(format!("asset-{}", uuid::Uuid::now_v7().simple()))
    } else {
        relative
    }
}

fn file_reference(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

#[async_trait]
impl DeliveryAdapter for LocalDiskSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_terminal(&self) -> bool {
        true
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(adapter = %self.name, correlation_id = %request.correlation_id())
    )]
    async fn attempt(&self, request: &DeliveryRequest, deadline: Duration) -> AdapterOutcome {
        // メール等のアセット以外はディスクに書く対象がないのでログに残す
        let Some(asset) = request.as_asset() else {
            return self.fallback.attempt(request, deadline).await;
        };

        match self.write(asset).await {
            Ok(path) => {
                tracing::warn!(
                    correlation_id = %request.correlation_id(),
                    path = %path.display(),
                    size = asset.size(),
                    "バケットがすべて失敗したためローカルディスクに保存"
                );
                AdapterOutcome::success_with(file_reference(&path))
            }
            Err(e) => {
                tracing::warn!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::SINK_WRITE,
                    correlation_id = %request.correlation_id(),
                    "ローカルディスクへの書き込みに失敗、メモリに退避: {}",
                    e
                );
                self.fallback.attempt(request, deadline).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("quotations/q1/a.png", "quotations/q1/a.png")]
    #[case("/quotations/q1/a.png", "quotations/q1/a.png")]
    #[case("../../etc/passwd", "etc/passwd")]
    #[case("quotations/./q1/../a.png", "quotations/q1/a.png")]
    #[case("quotations\\q1\\a.png", "quotations/q1/a.png")]
    fn test_保存先パスからトラバーサル要素を取り除く(
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(sanitize(input), PathBuf::from(expected));
    }

    #[test]
    fn test_空のパスは生成した名前になる() {
        let path = sanitize("../");
        assert!(path.to_string_lossy().starts_with("asset-"));
    }

    #[tokio::test]
    async fn test_アセットを書き込みfile参照を返す() {
        let dir = tempfile::tempdir().unwrap();
        let sut = LocalDiskSink::new(dir.path());
        let request = DeliveryRequest::new(
            AssetPayload::new(vec![1, 2, 3], "image/png", "quotations/q1/a.png").into(),
        );

        let outcome = sut.attempt(&request, Duration::from_secs(1)).await;

        let written = dir.path().join("quotations/q1/a.png");
        assert_eq!(tokio::fs::read(&written).await.unwrap(), vec![1, 2, 3]);
        let reference = outcome.external_reference().unwrap();
        assert!(reference.starts_with("file://"));
        assert!(reference.ends_with("quotations/q1/a.png"));
        assert!(sut.fallback().entries().is_empty());
    }

    #[tokio::test]
    async fn test_書き込みに失敗してもメモリに退避して成功を返す() {
        let dir = tempfile::tempdir().unwrap();
        // base_dir の位置に通常ファイルを置いてディレクトリ作成を失敗させる
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"x").await.unwrap();
        let sut = LocalDiskSink::new(&blocker);
        let request =
            DeliveryRequest::new(AssetPayload::new(vec![1], "image/png", "q/a.png").into());

        let outcome = sut.attempt(&request, Duration::from_secs(1)).await;

        assert!(outcome.is_success());
        assert!(outcome.external_reference().unwrap().starts_with("terminal-log:"));
        assert_eq!(sut.fallback().entries().len(), 1);
    }

    #[test]
    fn test_終端シンクとして扱われる() {
        assert!(LocalDiskSink::new("/tmp").is_terminal());
    }
}

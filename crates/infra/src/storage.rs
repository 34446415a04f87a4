//! # アセット保存アダプタ
//!
//! アセットアップロードクラスの配信チェーンに並べる保存先。
//!
//! - [`S3StorageAdapter`]: S3 互換バケット（バケット / エンドポイントごとに 1 インスタンス）
//! - [`LocalDiskSink`]: ローカルディスクへの書き込み（終端シンク）

pub mod local_disk;
pub mod s3;

pub use local_disk::LocalDiskSink;
pub use s3::S3StorageAdapter;

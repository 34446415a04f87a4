//! # メール配信アダプタ
//!
//! メールクラスの配信チェーンに並べるプロバイダ実装。
//!
//! - [`TransactionalApiAdapter`]: HTTP トランザクションメール API（チェーン先頭向け）
//! - [`SesEmailAdapter`]: AWS SES v2
//! - [`SmtpEmailAdapter`]: SMTP リレー（ポート / TLS 方式ごとに 1 インスタンス）
//!
//! いずれも [`DeliveryAdapter`](crate::adapter::DeliveryAdapter) を実装し、
//! プロバイダ固有のエラーを [`AdapterOutcome`](cascade_domain::delivery::AdapterOutcome)
//! に分類して返す。

mod http_api;
pub mod ses;
mod smtp;

pub use http_api::{TransactionalApiAdapter, TransactionalApiConfig};
pub use ses::SesEmailAdapter;
pub use smtp::{SmtpEmailAdapter, SmtpSecurity, SmtpSettings};

//! 統合テスト共通のヘルパー

#![allow(dead_code)]

use std::sync::Arc;

use cascade_delivery::FallbackExecutor;
use cascade_domain::{
    clock::SystemClock,
    delivery::{AssetPayload, DeliveryRecord, DeliveryRequest, EmailMessage},
};
use cascade_shared::observability::init_test_tracing;

pub fn executor() -> FallbackExecutor {
    init_test_tracing();
    FallbackExecutor::new(Arc::new(SystemClock))
}

pub fn email_request(to: &str) -> DeliveryRequest {
    DeliveryRequest::new(
        EmailMessage {
            to:        to.to_string(),
            subject:   "[Cascade] 見積もり依頼を受け付けました".to_string(),
            html_body: "<p>お問い合わせありがとうございます</p>".to_string(),
            text_body: "お問い合わせありがとうございます".to_string(),
            reply_to:  None,
        }
        .into(),
    )
}

pub fn image(name: &str) -> AssetPayload {
    AssetPayload::new(vec![0xff, 0xd8, 0xff], "image/jpeg", format!("quotations/q1/{name}"))
}

/// 試行記録のアダプタ名一覧
pub fn adapter_names(record: &DeliveryRecord) -> Vec<String> {
    record
        .attempts()
        .iter()
        .map(|a| a.adapter_name.clone())
        .collect()
}

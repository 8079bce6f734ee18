#![allow(dead_code)]

use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::{json, Value};
use std::path::Path;
use support_triage::AppConfig;

pub const CLASSIFY_MARKER: &str = "support ticket triage classifier";
pub const DRAFT_MARKER: &str = "Draft a helpful reply";

/// 指向 mock server 的配置，重試不等待
pub fn test_config(server: &MockServer, data_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.llm.base_url = server.url("/v1");
    config.llm.api_key = Some("sk-test".to_string());
    config.kb.persist_dir = data_dir.join("kb").to_string_lossy().into_owned();
    config.database.url = ":memory:".to_string();
    config.retry.max_attempts = 2;
    config.retry.multiplier_seconds = 0.0;
    config.retry.min_wait_seconds = 0.0;
    config.retry.max_wait_seconds = 0.0;
    config
}

pub fn chat_reply(content: &Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content.to_string()},
            "finish_reason": "stop"
        }]
    })
}

pub async fn mock_chat<'a>(server: &'a MockServer, marker: &str, content: Value) -> Mock<'a> {
    let marker = marker.to_string();
    server
        .mock_async(move |when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains(marker.as_str());
            then.status(200).json_body(chat_reply(&content));
        })
        .await
}

pub async fn mock_embeddings<'a>(
    server: &'a MockServer,
    marker: &str,
    vectors: Vec<Vec<f32>>,
) -> Mock<'a> {
    let marker = marker.to_string();
    let data: Vec<Value> = vectors
        .into_iter()
        .enumerate()
        .map(|(index, embedding)| json!({"object": "embedding", "index": index, "embedding": embedding}))
        .collect();
    server
        .mock_async(move |when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .body_contains(marker.as_str());
            then.status(200).json_body(json!({"object": "list", "data": data}));
        })
        .await
}

pub fn write_kb_docs(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("refunds.md"),
        "# Refunds\n\nRefunds are issued within 5 business days of approval.",
    )
    .unwrap();
    std::fs::write(
        dir.join("shipping.md"),
        "# Shipping\n\nStandard shipping takes 3-5 business days.",
    )
    .unwrap();
}

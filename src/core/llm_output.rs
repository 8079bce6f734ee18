use crate::utils::error::{Result, TriageError};
use serde::de::DeserializeOwned;

/// 模型偶爾會把 JSON 包在 markdown fence 裡
pub fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

pub fn parse_json_output<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(&cleaned).map_err(|e| TriageError::LlmOutputError {
        message: format!("{} (output starts with: {:?})", e, preview(&cleaned)),
    })
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

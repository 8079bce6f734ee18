//! 單元測試共用的替身實作

use crate::domain::model::KbHit;
use crate::domain::ports::{ChatModel, Retriever};
use crate::utils::error::{Result, TriageError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// 依序回傳預先設定的回應，並記錄收到的 prompt
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TriageError::LlmError {
                    message: "script exhausted".to_string(),
                })
            })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct StaticRetriever {
    hits: Vec<KbHit>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl StaticRetriever {
    pub fn new(hits: Vec<KbHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<KbHit>> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), top_k));
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

pub fn hit(source: Option<&str>, chunk_id: Option<usize>, text: &str) -> KbHit {
    KbHit {
        text: text.to_string(),
        source: source.map(str::to_string),
        chunk_id,
        distance: 0.1,
    }
}

//! 回覆草稿：以 KB 片段為唯一依據產生客服回覆。
//! KB 資訊不足時要求模型提出澄清問題，而不是自行編造政策。

use crate::core::llm_output::parse_json_output;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{DraftReply, KbHit, TicketClassification};
use crate::domain::ports::{ChatModel, Retriever};
use crate::utils::error::Result;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// 模型輸出的寬鬆版本，citations 可能缺少或為 null
#[derive(Debug, Deserialize)]
struct RawDraft {
    subject: String,
    body: String,
    #[serde(default)]
    citations: Option<Vec<String>>,
    #[serde(default)]
    needs_clarification: Option<bool>,
}

/// 意圖加上客戶原文作為檢索 query，命中率較好
pub fn retrieval_query(
    classification: &TicketClassification,
    ticket_subject: &str,
    ticket_body: &str,
) -> String {
    format!(
        "{}. {}\n{}",
        classification.intent, ticket_subject, ticket_body
    )
}

pub fn format_kb_snippets(hits: &[KbHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let chunk = hit
                .chunk_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "?".to_string());
            format!(
                "[KB {}] SOURCE={} CHUNK={}\n{}",
                i + 1,
                hit.source.as_deref().unwrap_or("unknown_source"),
                chunk,
                hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_draft_prompt(
    ticket_subject: &str,
    ticket_body: &str,
    classification: &TicketClassification,
    kb_hits: &[KbHit],
) -> String {
    let kb_block = format_kb_snippets(kb_hits);

    format!(
        r#"
You are a customer support agent. Draft a helpful reply.

STRICT RULES:
1) Use ONLY the KB snippets below for policy/steps.
2) If KB is insufficient or unclear, ask 1-2 clarification questions.
3) Do NOT mention internal systems, embeddings, vector search, or "KB".
4) Be polite, professional, concise.
5) Output MUST be valid JSON matching schema:
   {{
     "subject": string,
     "body": string,
     "citations": [string],
     "needs_clarification": boolean
   }}

Ticket context:
- Intent: {intent}
- Priority: {priority}
- Confidence: {confidence}

Customer message:
SUBJECT: {ticket_subject}
BODY: {ticket_body}

KB snippets (your only source of truth):
{kb_block}

Now return ONLY JSON.
"#,
        intent = classification.intent,
        priority = classification.priority,
        confidence = classification.confidence,
    )
}

/// 沒有 citations 時改用檢索結果的來源檔名（排序、去重）
fn fallback_citations(hits: &[KbHit]) -> Vec<String> {
    hits.iter()
        .map(|hit| hit.source.clone().unwrap_or_else(|| "unknown".to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct Drafter {
    model: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    retry: RetryPolicy,
    top_k: usize,
}

impl Drafter {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        retry: RetryPolicy,
        top_k: usize,
    ) -> Self {
        Self {
            model,
            retriever,
            retry,
            top_k,
        }
    }

    pub async fn draft_reply(
        &self,
        ticket_subject: &str,
        ticket_body: &str,
        classification: &TicketClassification,
    ) -> Result<DraftReply> {
        self.retry
            .run("draft_reply", |attempt| {
                self.draft_once(ticket_subject, ticket_body, classification, attempt)
            })
            .await
    }

    async fn draft_once(
        &self,
        ticket_subject: &str,
        ticket_body: &str,
        classification: &TicketClassification,
        attempt: u32,
    ) -> Result<DraftReply> {
        let query = retrieval_query(classification, ticket_subject, ticket_body);
        let kb_hits = self.retriever.retrieve(&query, self.top_k).await?;
        tracing::debug!(hits = kb_hits.len(), attempt, "Retrieved KB snippets");

        let prompt = build_draft_prompt(ticket_subject, ticket_body, classification, &kb_hits);
        let raw = self.model.complete(&prompt).await?;
        let parsed: RawDraft = parse_json_output(&raw)?;

        let citations = match parsed.citations {
            Some(citations) if !citations.is_empty() => citations,
            _ => fallback_citations(&kb_hits),
        };

        Ok(DraftReply {
            subject: parsed.subject,
            body: parsed.body,
            citations,
            needs_clarification: parsed.needs_clarification.unwrap_or(false),
        })
    }
}

use crate::adapters::kb::KnowledgeBase;
use crate::adapters::openai::{OpenAiChatModel, OpenAiClient, OpenAiEmbedder};
use crate::config::AppConfig;
use crate::core::classify::Classifier;
use crate::core::decision::DecisionPolicy;
use crate::core::draft::Drafter;
use crate::core::pii::redact_ticket;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{TicketInput, TriageOutput};
use crate::domain::ports::{ChatModel, Retriever};
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Instant;

/// Triage 流程編排：PII 遮罩 → 分類 → KB 草稿 → 規則決策
pub struct TriageAgent {
    classifier: Classifier,
    drafter: Drafter,
    policy: DecisionPolicy,
}

impl TriageAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        config: &AppConfig,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        Self {
            classifier: Classifier::new(model.clone(), retry.clone()),
            drafter: Drafter::new(model, retriever, retry, config.kb.top_k),
            policy: DecisionPolicy::from(&config.policy),
        }
    }

    /// 使用 OpenAI 相容 API 與本地 KB 索引建立 agent
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = OpenAiClient::from_config(config)?;
        let model = Arc::new(OpenAiChatModel::new(client.clone(), &config.llm));
        let embedder = Arc::new(OpenAiEmbedder::new(client, &config.embeddings));
        let kb = Arc::new(KnowledgeBase::from_config(embedder, &config.kb, &config.embeddings));
        Ok(Self::new(model, kb, config))
    }

    pub async fn run(&self, ticket: TicketInput) -> Result<TriageOutput> {
        let start = Instant::now();

        // customer_email 不會送進 LLM
        let redacted = redact_ticket(&ticket.subject, &ticket.body, false);
        tracing::info!(
            channel = %ticket.channel,
            pii_findings = redacted.pii_findings.len(),
            "🔒 PII redaction complete"
        );

        let classification = self
            .classifier
            .classify(&redacted.subject, &redacted.body)
            .await?;
        tracing::info!(
            intent = %classification.intent,
            priority = %classification.priority,
            confidence = classification.confidence,
            "🏷️ Ticket classified"
        );

        let draft = self
            .drafter
            .draft_reply(&redacted.subject, &redacted.body, &classification)
            .await?;
        tracing::info!(
            citations = draft.citations.len(),
            needs_clarification = draft.needs_clarification,
            "✍️ Draft reply ready"
        );

        let decision = self.policy.decide(&classification, &draft);
        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            decision = %decision.decision,
            reason = %decision.reason,
            latency_ms,
            "✅ Triage decision made"
        );

        Ok(TriageOutput {
            ticket,
            redacted,
            classification,
            draft,
            decision,
            latency_ms,
        })
    }
}

use crate::core::llm_output::parse_json_output;
use crate::core::retry::RetryPolicy;
use crate::domain::model::TicketClassification;
use crate::domain::ports::ChatModel;
use crate::utils::error::Result;
use std::sync::Arc;

/// 分類 prompt：要求模型只輸出固定欄位的 JSON，reasoning 不得包含 PII
pub fn build_classification_prompt(ticket_subject: &str, ticket_body: &str) -> String {
    format!(
        r#"
You are a support ticket triage classifier.

Classify the ticket into:
- intent: one of
  ["billing_refund","technical_issue","account_access","shipping_delivery","product_question","complaint_escalation","unknown"]
- priority: one of ["P0","P1","P2","P3"]
- confidence: number 0.0 to 1.0
- reasoning: 1-2 short lines (no PII)

Priority guidance:
- P0: security/privacy breach, payment fraud, legal threats, account takeover, credit card exposure
- P1: user blocked from core usage (cannot login, app down, payment failed)
- P2: degraded experience (bug with workaround, delivery delay < 7 days, partial issues)
- P3: general questions, feature requests, low urgency

Ticket:
SUBJECT: {ticket_subject}
BODY: {ticket_body}

Return ONLY valid JSON with keys: intent, priority, confidence, reasoning.
"#
    )
}

pub struct Classifier {
    model: Arc<dyn ChatModel>,
    retry: RetryPolicy,
}

impl Classifier {
    pub fn new(model: Arc<dyn ChatModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// 呼叫模型並驗證輸出，格式錯誤時依 RetryPolicy 重試
    pub async fn classify(
        &self,
        ticket_subject: &str,
        ticket_body: &str,
    ) -> Result<TicketClassification> {
        let prompt = build_classification_prompt(ticket_subject, ticket_body);
        self.retry
            .run("classify", |attempt| self.classify_once(&prompt, attempt))
            .await
    }

    async fn classify_once(&self, prompt: &str, attempt: u32) -> Result<TicketClassification> {
        tracing::debug!(model = self.model.model_name(), attempt, "Calling classifier");
        let raw = self.model.complete(prompt).await?;
        let classification: TicketClassification = parse_json_output(&raw)?;
        classification.validate()?;
        Ok(classification)
    }
}

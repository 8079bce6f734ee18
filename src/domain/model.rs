use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::TriageError;
use crate::utils::validation::{validate_email, validate_length, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BillingRefund,
    TechnicalIssue,
    AccountAccess,
    ShippingDelivery,
    ProductQuestion,
    ComplaintEscalation,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::BillingRefund,
        Intent::TechnicalIssue,
        Intent::AccountAccess,
        Intent::ShippingDelivery,
        Intent::ProductQuestion,
        Intent::ComplaintEscalation,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::BillingRefund => "billing_refund",
            Intent::TechnicalIssue => "technical_issue",
            Intent::AccountAccess => "account_access",
            Intent::ShippingDelivery => "shipping_delivery",
            Intent::ProductQuestion => "product_question",
            Intent::ComplaintEscalation => "complaint_escalation",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s.trim())
            .ok_or_else(|| TriageError::ValidationError {
                message: format!("unknown intent '{}'", s),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::P0, Priority::P1, Priority::P2, Priority::P3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str() == s.trim())
            .ok_or_else(|| TriageError::ValidationError {
                message: format!("unknown priority '{}'", s),
            })
    }
}

/// 分類步驟的輸出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketClassification {
    pub intent: Intent,
    pub priority: Priority,
    pub confidence: f64,
    pub reasoning: String,
}

impl TicketClassification {
    pub fn validate(&self) -> Result<(), TriageError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(TriageError::LlmOutputError {
                message: format!("confidence {} outside [0.0, 1.0]", self.confidence),
            });
        }
        Ok(())
    }
}

/// 回覆草稿步驟的輸出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftReply {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub needs_clarification: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoSend,
    HumanReview,
    Escalate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoSend => "auto_send",
            Decision::HumanReview => "human_review",
            Decision::Escalate => "escalate",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision: Decision,
    pub reason: String,
    pub auto_send_allowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiKind {
    CreditCard,
    Aadhaar,
    Pan,
    Email,
    Phone,
    Ip,
}

impl PiiKind {
    pub fn label(&self) -> &'static str {
        match self {
            PiiKind::CreditCard => "CREDIT_CARD",
            PiiKind::Aadhaar => "AADHAAR",
            PiiKind::Pan => "PAN",
            PiiKind::Email => "EMAIL",
            PiiKind::Phone => "PHONE",
            PiiKind::Ip => "IP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiFinding {
    #[serde(rename = "type")]
    pub kind: PiiKind,
    pub value: String,
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbHit {
    pub text: String,
    pub source: Option<String>,
    pub chunk_id: Option<usize>,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketInput {
    pub subject: String,
    pub body: String,
    pub customer_email: Option<String>,
    pub channel: String,
}

/// API 與 CLI 共用的工單欄位檢查
impl Validate for TicketInput {
    fn validate(&self) -> crate::utils::error::Result<()> {
        validate_length("subject", &self.subject, 1, Some(255))?;
        validate_length("body", &self.body, 1, None)?;
        validate_length("channel", &self.channel, 0, Some(50))?;
        if let Some(email) = &self.customer_email {
            validate_email("customer_email", email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedTicket {
    pub subject: String,
    pub body: String,
    pub pii_findings: Vec<PiiFinding>,
}

/// 整個 triage 流程的結構化結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutput {
    pub ticket: TicketInput,
    pub redacted: RedactedTicket,
    pub classification: TicketClassification,
    pub draft: DraftReply,
    pub decision: DecisionResult,
    pub latency_ms: u64,
}

// ---- 持久化實體 ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub subject: String,
    pub body: String,
    pub customer_email: Option<String>,
    pub channel: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: i64,
    pub ticket_id: i64,
    pub intent: Option<String>,
    pub priority: Option<String>,
    pub confidence: Option<f64>,
    pub draft_reply: Option<String>,
    pub decision: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgentRun {
    pub ticket_id: i64,
    pub intent: Option<String>,
    pub priority: Option<String>,
    pub confidence: Option<f64>,
    pub draft_reply: Option<String>,
    pub decision: Option<String>,
}

impl NewAgentRun {
    pub fn from_output(ticket_id: i64, output: &TriageOutput) -> Self {
        let draft_text = format!("SUBJECT: {}\n\n{}", output.draft.subject, output.draft.body)
            .trim()
            .to_string();
        Self {
            ticket_id,
            intent: Some(output.classification.intent.to_string()),
            priority: Some(output.classification.priority.to_string()),
            confidence: Some(output.classification.confidence),
            draft_reply: Some(draft_text),
            decision: Some(output.decision.decision.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(TriageError::ValidationError {
                message: format!("unknown review status '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub agent_run_id: i64,
    pub status: ReviewStatus,
    pub reviewer_notes: Option<String>,
    pub final_reply: Option<String>,
    pub created_at: DateTime<Utc>,
}

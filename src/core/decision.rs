//! 決策節點：規則式（非 LLM），決定草稿要自動寄出、交給人工審核或升級處理。

use crate::config::PolicyConfig;
use crate::domain::model::{
    Decision, DecisionResult, DraftReply, Intent, Priority, TicketClassification,
};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    auto_send_enabled: bool,
    threshold: f64,
    blocked_intents: HashSet<Intent>,
    blocked_priorities: HashSet<Priority>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for DecisionPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            auto_send_enabled: config.auto_send_enabled,
            threshold: config.auto_send_confidence,
            blocked_intents: config.blocked_intents.iter().copied().collect(),
            blocked_priorities: config.blocked_priorities.iter().copied().collect(),
        }
    }
}

fn review(reason: String) -> DecisionResult {
    DecisionResult {
        decision: Decision::HumanReview,
        reason,
        auto_send_allowed: false,
    }
}

impl DecisionPolicy {
    /// 規則依序判斷，第一個符合的就回傳
    pub fn decide(
        &self,
        classification: &TicketClassification,
        draft: &DraftReply,
    ) -> DecisionResult {
        if draft.needs_clarification {
            return review(
                "Draft requires clarification from customer; avoid auto-send.".to_string(),
            );
        }

        if classification.priority == Priority::P0 {
            return DecisionResult {
                decision: Decision::Escalate,
                reason: "Priority P0 detected (security/legal/payment-fraud risk).".to_string(),
                auto_send_allowed: false,
            };
        }

        if self.blocked_priorities.contains(&classification.priority) {
            return review(format!(
                "Priority {} requires human verification.",
                classification.priority
            ));
        }

        if self.blocked_intents.contains(&classification.intent) {
            return review(format!(
                "Intent '{}' is blocked from auto-send.",
                classification.intent
            ));
        }

        if !self.auto_send_enabled {
            return review("Auto-send is disabled by configuration.".to_string());
        }

        if classification.confidence < self.threshold {
            return review(format!(
                "Confidence {:.2} below threshold {:.2}.",
                classification.confidence, self.threshold
            ));
        }

        DecisionResult {
            decision: Decision::AutoSend,
            reason: "Meets confidence threshold and not blocked by policy.".to_string(),
            auto_send_allowed: true,
        }
    }
}

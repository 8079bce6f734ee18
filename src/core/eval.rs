//! 離線評估：以標註好的 CSV 資料集跑 agent，統計分類準確率與決策分佈

use crate::core::runner::TriageAgent;
use crate::domain::model::{Intent, Priority, TicketInput};
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalCase {
    pub subject: String,
    pub body: String,
    pub expected_intent: Intent,
    pub expected_priority: Priority,
}

/// 欄位：subject,body,expected_intent,expected_priority
pub fn load_dataset(path: &Path) -> Result<Vec<EvalCase>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let cases = reader
        .deserialize()
        .collect::<std::result::Result<Vec<EvalCase>, csv::Error>>()?;
    tracing::info!("📊 Loaded {} evaluation cases from {}", cases.len(), path.display());
    Ok(cases)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseMiss {
    pub row: usize,
    pub subject: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvalReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub intent_correct: usize,
    pub priority_correct: usize,
    pub decisions: BTreeMap<String, usize>,
    pub misses: Vec<CaseMiss>,
}

impl EvalReport {
    fn ratio(hits: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn intent_accuracy(&self) -> f64 {
        Self::ratio(self.intent_correct, self.completed)
    }

    pub fn priority_accuracy(&self) -> f64 {
        Self::ratio(self.priority_correct, self.completed)
    }
}

/// 單筆失敗只記錄、不中斷整體評估
pub async fn evaluate(agent: &TriageAgent, cases: &[EvalCase]) -> EvalReport {
    let mut report = EvalReport {
        total: cases.len(),
        ..EvalReport::default()
    };

    for (idx, case) in cases.iter().enumerate() {
        let row = idx + 1;
        let input = TicketInput {
            subject: case.subject.clone(),
            body: case.body.clone(),
            customer_email: None,
            channel: "eval".to_string(),
        };

        let output = match agent.run(input).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(row, "⚠️ Evaluation case failed: {}", e);
                report.failed += 1;
                continue;
            }
        };

        report.completed += 1;
        let actual = &output.classification;
        let intent_ok = actual.intent == case.expected_intent;
        let priority_ok = actual.priority == case.expected_priority;
        if intent_ok {
            report.intent_correct += 1;
        }
        if priority_ok {
            report.priority_correct += 1;
        }
        if !intent_ok || !priority_ok {
            report.misses.push(CaseMiss {
                row,
                subject: case.subject.clone(),
                expected: format!("{}/{}", case.expected_intent, case.expected_priority),
                actual: format!("{}/{}", actual.intent, actual.priority),
            });
        }
        *report
            .decisions
            .entry(output.decision.decision.to_string())
            .or_insert(0) += 1;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::testing::{ScriptedModel, StaticRetriever};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_dataset() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "subject,body,expected_intent,expected_priority").unwrap();
        writeln!(file, "Refund please,\"I was charged twice, refund me\",billing_refund,P2").unwrap();
        writeln!(file, " Hacked , Someone took my account ,account_access, P0").unwrap();

        let cases = load_dataset(file.path()).unwrap();

        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].body, "I was charged twice, refund me");
        assert_eq!(cases[1].subject, "Hacked");
        assert_eq!(cases[1].expected_intent, Intent::AccountAccess);
        assert_eq!(cases[1].expected_priority, Priority::P0);
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "subject,body,expected_intent,expected_priority").unwrap();
        writeln!(file, "a,b,refunds,P2").unwrap();

        assert!(load_dataset(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_counts_hits_and_failures() {
        let classification = |intent: &str, priority: &str| {
            Ok(format!(
                r#"{{"intent":"{}","priority":"{}","confidence":0.9,"reasoning":"r"}}"#,
                intent, priority
            ))
        };
        let draft = || Ok(r#"{"subject":"Re","body":"Ok","citations":["faq.md"]}"#.to_string());

        let model = ScriptedModel::new(vec![
            classification("billing_refund", "P2"),
            draft(),
            classification("technical_issue", "P0"),
            draft(),
            Ok("garbage".to_string()),
        ]);
        let mut config = AppConfig::default();
        config.retry.max_attempts = 1;
        let agent = TriageAgent::new(model, StaticRetriever::new(vec![]), &config);

        let cases = vec![
            EvalCase {
                subject: "Refund".to_string(),
                body: "Charged twice".to_string(),
                expected_intent: Intent::BillingRefund,
                expected_priority: Priority::P2,
            },
            EvalCase {
                subject: "Hacked".to_string(),
                body: "Account taken".to_string(),
                expected_intent: Intent::AccountAccess,
                expected_priority: Priority::P0,
            },
            EvalCase {
                subject: "?".to_string(),
                body: "?".to_string(),
                expected_intent: Intent::Unknown,
                expected_priority: Priority::P3,
            },
        ];

        let report = evaluate(&agent, &cases).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.intent_correct, 1);
        assert_eq!(report.priority_correct, 2);
        assert_eq!(report.intent_accuracy(), 0.5);
        assert_eq!(report.priority_accuracy(), 1.0);
        assert_eq!(report.decisions.get("auto_send"), Some(&1));
        assert_eq!(report.decisions.get("escalate"), Some(&1));
        assert_eq!(report.misses.len(), 1);
        assert_eq!(report.misses[0].row, 2);
        assert_eq!(report.misses[0].actual, "technical_issue/P0");
    }
}

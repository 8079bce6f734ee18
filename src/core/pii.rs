//! PII 遮罩：在文字送進 LLM 或 embedding API 之前移除敏感資料，
//! 並保留結構化的 findings 供稽核使用。

use crate::domain::model::{PiiFinding, PiiKind, RedactedTicket};
use regex::{NoExpand, Regex};
use std::sync::OnceLock;

/// 套用順序有意義：高風險的卡號先處理，再處理證件、email、電話、IP
fn patterns() -> &'static [(PiiKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(PiiKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (PiiKind::CreditCard, r"\b(?:\d[ -]*?){13,19}\b"),
            (PiiKind::Aadhaar, r"\b\d{4}\s?\d{4}\s?\d{4}\b"),
            (PiiKind::Pan, r"(?i)\b[A-Z]{5}\d{4}[A-Z]\b"),
            (
                PiiKind::Email,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            ),
            (
                PiiKind::Phone,
                r"\b(?:\+?\d{1,3}[- ]?)?(?:\d{10}|\d{3}[- ]\d{3}[- ]\d{4})\b",
            ),
            (PiiKind::Ip, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
        ]
        .into_iter()
        .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("PII pattern is valid")))
        .collect()
    })
}

pub fn mask(kind: PiiKind) -> String {
    format!("[REDACTED:{}]", kind.label())
}

/// 遮罩文字中的 PII。
///
/// 每個 pattern 作用在前一個 pattern 處理後的文字上，
/// 所以 finding 的 `start`/`end` 是該階段文字中的 byte 位置。
/// `keep_values` 為 false 時不保留原始值。
pub fn redact_pii(text: &str, keep_values: bool) -> (String, Vec<PiiFinding>) {
    if text.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut working = text.to_string();
    let mut findings = Vec::new();

    for (kind, regex) in patterns() {
        for m in regex.find_iter(&working) {
            findings.push(PiiFinding {
                kind: *kind,
                value: if keep_values {
                    m.as_str().to_string()
                } else {
                    String::new()
                },
                start: m.start(),
                end: m.end(),
                field: None,
            });
        }

        let replacement = mask(*kind);
        working = regex
            .replace_all(&working, NoExpand(&replacement))
            .into_owned();
    }

    (working, findings)
}

/// 主旨與內文分開遮罩，findings 標記來源欄位
pub fn redact_ticket(subject: &str, body: &str, keep_values: bool) -> RedactedTicket {
    let (redacted_subject, subject_findings) = redact_pii(subject, keep_values);
    let (redacted_body, body_findings) = redact_pii(body, keep_values);

    let pii_findings = subject_findings
        .into_iter()
        .map(|f| PiiFinding {
            field: Some("subject".to_string()),
            ..f
        })
        .chain(body_findings.into_iter().map(|f| PiiFinding {
            field: Some("body".to_string()),
            ..f
        }))
        .collect();

    RedactedTicket {
        subject: redacted_subject,
        body: redacted_body,
        pii_findings,
    }
}

//! Prometheus 文字格式 (0.0.4) 的計數器與延遲直方圖

use crate::domain::model::Decision;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// 延遲直方圖上界（毫秒），最後一格為 +Inf
pub const LATENCY_BUCKETS_MS: [u64; 10] = [50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000];

#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Histogram {
    // 非累積計數，輸出時才累加；最後一格對應 +Inf
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn observe(&self, value: u64) {
        let slot = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct TriageMetrics {
    tickets: Counter,
    agent_runs: Counter,
    auto_send: Counter,
    human_review: Counter,
    escalate: Counter,
    latency_ms: Histogram,
}

impl TriageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket_received(&self) {
        self.tickets.inc();
    }

    pub fn agent_run_completed(&self, latency_ms: u64) {
        self.agent_runs.inc();
        self.latency_ms.observe(latency_ms);
    }

    pub fn record_decision(&self, decision: Decision) {
        match decision {
            Decision::AutoSend => self.auto_send.inc(),
            Decision::Escalate => self.escalate.inc(),
            Decision::HumanReview => self.human_review.inc(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let counters = [
            ("tickets_total", "Total tickets received", &self.tickets),
            ("agent_runs_total", "Total agent runs executed", &self.agent_runs),
            ("agent_auto_send_total", "Agent decisions: auto_send", &self.auto_send),
            ("agent_human_review_total", "Agent decisions: human_review", &self.human_review),
            ("agent_escalate_total", "Agent decisions: escalate", &self.escalate),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        let name = "agent_latency_ms";
        let _ = writeln!(out, "# HELP {} Agent end-to-end latency (ms)", name);
        let _ = writeln!(out, "# TYPE {} histogram", name);
        let mut cumulative = 0u64;
        for (slot, bucket) in self.latency_ms.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            let le = LATENCY_BUCKETS_MS
                .get(slot)
                .map(|bound| format!("{:.1}", *bound as f64))
                .unwrap_or_else(|| "+Inf".to_string());
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, le, cumulative);
        }
        let _ = writeln!(out, "{}_sum {}", name, self.latency_ms.sum.load(Ordering::Relaxed));
        let _ = writeln!(out, "{}_count {}", name, self.latency_ms.count.load(Ordering::Relaxed));
        out
    }
}

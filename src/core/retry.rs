use crate::config::RetryConfig;
use crate::utils::error::Result;
use std::future::Future;
use std::time::Duration;

/// 指數退避重試：第 n 次失敗後等待 clamp(multiplier * 2^(n-1), min, max)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            multiplier: Duration::from_secs_f64(config.multiplier_seconds.max(0.0)),
            min_wait: Duration::from_secs_f64(config.min_wait_seconds.max(0.0)),
            max_wait: Duration::from_secs_f64(config.max_wait_seconds.max(0.0)),
        }
    }
}

impl RetryPolicy {
    /// 不等待的重試，測試用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            multiplier: Duration::ZERO,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let raw = self.multiplier.as_secs_f64() * 2f64.powi(exponent);
        let clamped = raw
            .max(self.min_wait.as_secs_f64())
            .min(self.max_wait.as_secs_f64());
        Duration::from_secs_f64(clamped)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && err.is_retryable() => {
                    let wait = self.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "🔄 attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(operation, attempt, error = %err, "❌ giving up");
                    return Err(err);
                }
            }
        }
    }
}

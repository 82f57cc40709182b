//! Exponential backoff for rate-limited submissions.

use std::future::Future;
use std::time::Duration;

use stencil_core::config::RetryConfig;
use stencil_vcs::SubmissionError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
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
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_factor: config.backoff_factor.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait after failed attempt number `attempt` (1-based). A server hint
    /// replaces the computed delay; both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let computed = || {
            let exp = attempt.saturating_sub(1) as i32;
            let ms = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
            Duration::from_millis(ms.min(self.max_delay.as_millis() as f64).round() as u64)
        };
        hint.unwrap_or_else(computed).min(self.max_delay)
    }

    /// Run `op`, retrying only rate-limit failures.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, SubmissionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SubmissionError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_rate_limited() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, err.retry_after());
                    tracing::warn!(
                        repository = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

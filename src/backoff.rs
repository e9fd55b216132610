use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::UpstreamError;

/// Bounded exponential backoff with jitter for a single upstream call.
///
/// Defaults:
/// - retries: 3 (so at most 4 attempts)
/// - base delay: 200ms
/// - max delay: 2000ms
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(2_000),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retrying after the given failed attempt (0-based):
    /// `min(base * 2^attempt, max)` plus jitter uniform in a fifth of the
    /// capped delay. A single delay therefore never exceeds `max * 1.2`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = (self.base_delay.as_millis() as u64).max(1);
        let max = (self.max_delay.as_millis() as u64).max(base);
        let capped = base
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(max);
        let jitter = fastrand::u64(0..=capped / 5);
        Duration::from_millis(capped + jitter)
    }
}

/// Run `op` with retries under `policy`.
///
/// `op` receives the 0-based attempt counter. Failures classified as
/// retryable by [`UpstreamError::is_retryable`] are retried after a
/// backoff delay until attempts are exhausted; fatal failures propagate
/// immediately. The original error is returned unchanged in either case.
///
/// Holds no state across calls; concurrent executions are independent.
pub async fn with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, UpstreamError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.retries || !err.is_retryable() {
                    return Err(err);
                }
                sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

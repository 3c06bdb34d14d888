//! Bounded exponential backoff for transient provider failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap for the exponential delay.
    pub max_delay: Duration,
    /// Cap for a server-provided `Retry-After` hint.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    ///
    /// The exponential delay doubles from `base_delay` up to `max_delay`; a
    /// retry-after hint wins when it is longer, bounded by `max_retry_after`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        match retry_after {
            Some(hint) => backoff.max(hint.min(self.max_retry_after)),
            None => backoff,
        }
    }
}

/// Run `op` until it succeeds, fails terminally, or the attempts run out.
///
/// Only [`LlmError::is_transient`] failures are retried. The last error is
/// returned once attempts are exhausted. Cancellation interrupts both the
/// call and the backoff sleep and yields [`LlmError::Cancelled`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            r = op(attempt) => r,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_transient() || attempt >= max_attempts {
            return Err(err);
        }

        let retry_after = match &err {
            LlmError::RateLimit { retry_after } => *retry_after,
            _ => None,
        };
        let delay = policy.delay_for(attempt, retry_after);
        warn!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %err, "transient failure, backing off");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

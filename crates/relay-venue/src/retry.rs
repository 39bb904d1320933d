//! Retry executor with exponential backoff and jitter.
//!
//! An explicit function over an operation closure and a policy, so retry
//! behavior stays testable independent of any adapter method. Error
//! classification comes from `VenueError::is_transient`; permanent errors
//! surface immediately and never consume the attempt budget.

use crate::error::{VenueError, VenueResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff policy for retried venue operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (4 = 3 retries).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each retry after that.
    pub base_delay: Duration,
    /// Ceiling on the pre-jitter delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Pre-jitter delay after failed attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ms = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exponent);
        Duration::from_millis(ms).min(self.max_delay)
    }

    /// Apply 0.8-1.2x jitter so concurrently-failing callers do not
    /// retry in lockstep.
    pub fn jittered(&self, delay: Duration) -> Duration {
        let factor = 0.8 + (clock_entropy() % 401) as f64 / 1000.0;
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }
}

/// Clock-derived entropy for jitter; avoids pulling in an RNG crate for
/// a non-cryptographic purpose.
fn clock_entropy() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0)
}

/// Run `op`, retrying transient failures per `policy`.
///
/// Returns the first success, a permanent error immediately, or the last
/// transient error once the attempt budget is exhausted.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> VenueResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VenueResult<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt >= policy.max_attempts {
                    return Err(e);
                }
                let delay = policy.jittered(policy.delay_for(attempt));
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient venue error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

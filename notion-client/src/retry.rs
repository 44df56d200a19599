//! Retry policy with exponential backoff

use std::time::Duration;

/// Status codes worth retrying
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 500, 502, 503];

/// Exponential backoff policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor)
    }

    /// Delay for `attempt`, never shorter than a server-provided `Retry-After`.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.delay_for(attempt);
        match retry_after {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }
}

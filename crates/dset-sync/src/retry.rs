use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded retry with growing backoff for presigned-URL requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 250,
            timeout_secs: 60,
        }
    }
}

const MAX_BACKOFF: Duration = Duration::from_secs(30);

impl RetryPolicy {
    /// Delay after the failed `attempt` (1-based): base, 2x base, 4x base, ...
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let millis = self.base_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(millis).min(MAX_BACKOFF)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

//! # Attempt budget for a watcher.
//!
//! [`RetryPolicy`] pairs the maximum number of consecutive failed attempts with
//! the [`BackoffPolicy`] used between them. The budget applies separately to the
//! update request and to status polling: a successful update request resets it.
//!
//! ```text
//! failure #1 ─► attempt=1 ─► sleep(backoff.next(0))
//! failure #2 ─► attempt=2 ─► sleep(backoff.next(1))
//! ...
//! failure #max_attempts+1 ─► exhausted ─► Outcome::AttemptsExhausted
//! ```

use serde::Deserialize;

use super::BackoffPolicy;

/// Bounded retry parameters.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum consecutive failures tolerated before giving up.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// `max_attempts = 5` with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Returns `true` once `attempt` failures exceed the budget.
    #[inline]
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

//! # Backoff policy for retrying platform calls.
//!
//! [`BackoffPolicy`] decides how long a watcher sleeps after a failed update
//! request or status poll before trying again. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first failure;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay for failure `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base is derived from the failure count alone,
//! so jittered output never feeds back into later delays.
//!
//! The default is a **fixed** 30 second delay (`factor = 1.0`), which is what
//! remote deployment platforms tolerate without throttling.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use beanstalk_deployer::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(5),
//!     max: Duration::from_secs(60),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(5));
//! assert_eq!(backoff.next(1), Duration::from_secs(10));
//! assert_eq!(backoff.next(9), Duration::from_secs(60));
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    #[serde(deserialize_with = "crate::config::duration::deserialize")]
    pub first: Duration,
    /// Maximum delay cap.
    #[serde(deserialize_with = "crate::config::duration::deserialize")]
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` = constant delay).
    pub factor: f64,
    /// Randomization applied to each delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a constant policy:
    /// - `first = 30s`;
    /// - `max = 30s`;
    /// - `factor = 1.0`;
    /// - `jitter = None`.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(30))
    }
}

impl BackoffPolicy {
    /// A constant delay with no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay after the given failure number (0-indexed).
    ///
    /// # Notes
    /// - `factor == 1.0` keeps the delay at `first` (up to `max`).
    /// - `factor > 1.0` grows exponentially up to `max`.
    /// - Non-finite or negative intermediate values collapse to `max`.
    pub fn next(&self, failure: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failure.min(i32::MAX as u32) as i32;
        let raw = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

//! # Orchestrator settings.
//!
//! [`OrchestratorConfig`] centralizes the knobs of one update run: how many
//! watchers run at once, how often they poll, how many failures they tolerate
//! and how long a stopping run waits for them.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no semaphore)
//! - `max_polls = 0` → poll until the environment settles
//! - `deadline = 0s` → no deadline
//!
//! Durations accept integer seconds or humantime strings (`"500ms"`, `"30s"`, `"2m"`).

use std::time::Duration;

use serde::Deserialize;

use crate::config::duration;
use crate::policies::{BackoffPolicy, RetryPolicy};
use crate::watcher::WatcherParams;

/// Settings for [`UpdateOrchestrator`](crate::UpdateOrchestrator).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of watchers running at once (`0` = unlimited).
    pub max_concurrent: usize,

    /// Delay between status polls of one environment.
    #[serde(deserialize_with = "duration::deserialize")]
    pub poll_interval: Duration,

    /// Consecutive failed calls tolerated per phase before `AttemptsExhausted`.
    pub max_attempts: u32,

    /// Delay between failed calls.
    pub backoff: BackoffPolicy,

    /// Status polls allowed after an accepted update (`0` = unlimited).
    pub max_polls: u32,

    /// Time watchers get to stop after cancellation before they are aborted.
    #[serde(deserialize_with = "duration::deserialize")]
    pub grace: Duration,

    /// Wall-clock budget of the whole run (`0s` = none).
    #[serde(deserialize_with = "duration::deserialize")]
    pub deadline: Duration,

    /// Capacity of the event bus; a full bus holds publishers back.
    pub bus_capacity: usize,
}

impl OrchestratorConfig {
    /// Returns the watcher concurrency limit as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the run deadline as an `Option`.
    #[inline]
    pub fn deadline_limit(&self) -> Option<Duration> {
        if self.deadline == Duration::ZERO {
            None
        } else {
            Some(self.deadline)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Per-watcher parameters derived from this configuration.
    pub fn watcher_params(&self) -> WatcherParams {
        WatcherParams {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff: self.backoff,
            },
            poll_interval: self.poll_interval,
            max_polls: self.max_polls,
        }
    }
}

impl Default for OrchestratorConfig {
    /// Default configuration:
    ///
    /// - `max_concurrent = 5`
    /// - `poll_interval = 30s`
    /// - `max_attempts = 5`, `backoff` = constant 30s
    /// - `max_polls = 120` (one hour at the default interval)
    /// - `grace = 60s`, no deadline
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            poll_interval: Duration::from_secs(30),
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            max_polls: 120,
            grace: Duration::from_secs(60),
            deadline: Duration::ZERO,
            bus_capacity: 1024,
        }
    }
}

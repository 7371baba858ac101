//! Retry policies.
//!
//! This module groups the knobs that control **how often** a watcher retries a
//! failing platform call and **how long** it waits in between.
//!
//! ## Contents
//! - [`RetryPolicy`]   attempt budget + backoff
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//!
//! ## Quick wiring
//! ```text
//! OrchestratorConfig { retry: RetryPolicy, poll_interval, .. }
//!      └─► watcher::EnvironmentWatcher uses:
//!           - retry.exhausted(attempt) to decide Failed(AttemptsExhausted)
//!           - retry.backoff.next(attempt - 1) to schedule the next attempt
//! ```

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;

//! # LogWriter: events as structured log lines
//!
//! Renders every [`Event`] through `tracing` with structured fields, so the
//! deployment log lands wherever the installed subscriber writes (see
//! [`init_tracing`](crate::init_tracing)).
//!
//! ## Example output (pretty format)
//! ```text
//! INFO  update requested environment="shop-prod" attempt=1
//! INFO  shop-prod: 2024-01-01T00:00:04Z INFO updateEnvironment is starting.
//! WARN  status poll failed environment="shop-prod" attempt=1 err="throttled"
//! INFO  completed successfully environment="shop-prod" outcome=succeeded
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let env = e.environment.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let attempt = e.attempt.unwrap_or_default();
        let count = e.count.unwrap_or_default();

        match e.kind {
            EventKind::WatcherStarted => {
                info!(environment = env, status = e.status.as_deref(), "watching environment");
            }
            EventKind::CursorSeeded => {
                debug!(environment = env, cursor = reason, "event cursor seeded");
            }
            EventKind::EventHistoryUnavailable => {
                warn!(environment = env, err = reason, "event history unavailable, cursor starts now");
            }
            EventKind::UpdateRequested => {
                info!(environment = env, attempt, "update requested");
            }
            EventKind::UpdateAccepted => {
                info!(environment = env, attempt, "update accepted");
            }
            EventKind::UpdateFailed => {
                warn!(environment = env, attempt, err = reason, "update failed");
            }
            EventKind::BackoffScheduled => {
                info!(
                    environment = env,
                    attempt,
                    delay_ms = e.delay_ms,
                    err = reason,
                    "retry scheduled"
                );
            }
            EventKind::PlatformEvent => {
                if let Some(pe) = &e.platform_event {
                    info!("{env}: {} {} {}", pe.at.to_rfc3339(), pe.severity, pe.message);
                }
            }
            EventKind::EventsUnavailable => {
                warn!(environment = env, err = reason, "event log unavailable");
            }
            EventKind::StatusPolled => {
                debug!(
                    environment = env,
                    polls = count,
                    status = e.status.as_deref(),
                    version = reason,
                    "status polled"
                );
            }
            EventKind::PollFailed => {
                warn!(environment = env, attempt, err = reason, "status poll failed");
            }
            EventKind::WatcherFinished => {
                let outcome = e.outcome.map(|o| o.as_label()).unwrap_or("unknown");
                if e.outcome.is_some_and(|o| o.is_success()) {
                    info!(environment = env, outcome, polls = count, "{reason}");
                } else {
                    warn!(environment = env, outcome, polls = count, "{reason}");
                }
            }
            EventKind::RunStarted => {
                info!(target_version = reason, environments = count, "deployment started");
            }
            EventKind::NoEnvironments => {
                warn!(target_version = reason, "no environments found");
            }
            EventKind::DeadlineReached => {
                warn!(reason, "stopping watchers");
            }
            EventKind::GraceExceeded => {
                warn!(aborted = count, "watchers did not stop within grace period");
            }
            EventKind::WatcherPanicked => {
                warn!(environment = env, info = reason, "watcher panicked");
            }
            EventKind::RunFinished => {
                info!(verdict = reason, "deployment finished");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

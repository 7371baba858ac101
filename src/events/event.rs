//! # Deployment events emitted by watchers and the orchestrator.
//!
//! The [`EventKind`] enum classifies events into two groups:
//! - **Watcher events**: one environment's update flow (update request, polls,
//!   platform log lines, final outcome)
//! - **Run events**: orchestrator lifecycle (start, deadline, grace, verdict)
//!
//! The [`Event`] struct carries optional metadata (environment, attempt, count,
//! status, delay, outcome, platform log line) depending on the kind. `attempt`
//! always numbers a platform call; `count` carries tallies such as polls issued
//! or environments targeted.
//!
//! ## Ordering guarantees
//! The [`Bus`](crate::events::Bus) stamps each published event with a
//! monotonically increasing `seq`. Events of one environment are published by a
//! single watcher task, so their `seq` order is their causal order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use beanstalk_deployer::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::PollFailed)
//!     .with_environment("shop-prod")
//!     .with_reason("throttled")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(30));
//!
//! assert_eq!(ev.kind, EventKind::PollFailed);
//! assert_eq!(ev.environment.as_deref(), Some("shop-prod"));
//! assert_eq!(ev.delay_ms, Some(30_000));
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::platform::PlatformEvent;
use crate::watcher::Outcome;

/// Classification of deployment events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Watcher events ===
    /// Watcher started for an environment.
    ///
    /// Sets: `environment`, `status` (status before the update)
    WatcherStarted,

    /// Event cursor seeded from the newest existing platform event.
    ///
    /// Sets: `environment`, `reason` (cursor timestamp, or `empty`)
    CursorSeeded,

    /// The event history could not be read before the update; the cursor
    /// starts at the local clock.
    ///
    /// Sets: `environment`, `reason`
    EventHistoryUnavailable,

    /// Version update is about to be requested.
    ///
    /// Sets: `environment`, `attempt`
    UpdateRequested,

    /// The platform accepted the update request.
    ///
    /// Sets: `environment`, `attempt`
    UpdateAccepted,

    /// The update request failed.
    ///
    /// Sets: `environment`, `attempt`, `reason`
    UpdateFailed,

    /// A retry was scheduled after a failed call.
    ///
    /// Sets: `environment`, `attempt`, `delay_ms`, `reason`
    BackoffScheduled,

    /// A new line of the platform's event log.
    ///
    /// Sets: `environment`, `platform_event`
    PlatformEvent,

    /// Fetching the platform event log failed; the cursor did not move.
    ///
    /// Sets: `environment`, `reason`
    EventsUnavailable,

    /// Status poll returned.
    ///
    /// Sets: `environment`, `count` (polls so far), `status`, `reason`
    /// (deployed version label)
    StatusPolled,

    /// Status poll failed.
    ///
    /// Sets: `environment`, `attempt`, `reason`
    PollFailed,

    /// Watcher reached its terminal outcome.
    ///
    /// Sets: `environment`, `outcome`, `count` (polls issued), `reason` (summary line)
    WatcherFinished,

    // === Run events ===
    /// Orchestrator run started.
    ///
    /// Sets: `reason` (`application@version`), `count` (environments)
    RunStarted,

    /// Resolution produced no environment.
    ///
    /// Sets: `reason` (`application@version`)
    NoEnvironments,

    /// The run deadline elapsed or the run was cancelled; watchers are asked to stop.
    ///
    /// Sets: `reason`
    DeadlineReached,

    /// Watchers did not stop within the grace period and were aborted.
    ///
    /// Sets: `count` (aborted watchers)
    GraceExceeded,

    /// A watcher task panicked.
    ///
    /// Sets: `environment`, `reason` (panic message)
    WatcherPanicked,

    /// Orchestrator run finished.
    ///
    /// Sets: `reason` (`success` / `failure`)
    RunFinished,
}

/// Deployment event with optional metadata.
///
/// - `seq`: bus-assigned sequence for ordering (`0` until published)
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonically increasing sequence number, assigned by the bus.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Environment name, if applicable.
    pub environment: Option<Arc<str>>,
    /// Attempt number of a platform call (starting from 1).
    pub attempt: Option<u32>,
    /// Tally carried by the event (polls, environments, aborted watchers).
    pub count: Option<u32>,
    /// Environment status as reported by the platform.
    pub status: Option<Arc<str>>,
    /// Human-readable reason (errors, versions, summaries).
    pub reason: Option<Arc<str>>,
    /// Delay before the next call in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Terminal outcome of a watcher.
    pub outcome: Option<Outcome>,
    /// Platform log line relayed by a watcher.
    pub platform_event: Option<PlatformEvent>,
}

impl Event {
    /// Creates a new event of the given kind stamped with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            environment: None,
            attempt: None,
            count: None,
            status: None,
            reason: None,
            delay_ms: None,
            outcome: None,
            platform_event: None,
        }
    }

    /// Attaches an environment name.
    #[inline]
    pub fn with_environment(mut self, name: impl Into<Arc<str>>) -> Self {
        self.environment = Some(name.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a tally, saturating at `u32::MAX`.
    #[inline]
    pub fn with_count<N: TryInto<u32>>(mut self, n: N) -> Self {
        self.count = Some(n.try_into().unwrap_or(u32::MAX));
        self
    }

    /// Attaches a platform status.
    #[inline]
    pub fn with_status(mut self, status: impl Into<Arc<str>>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a terminal outcome.
    #[inline]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Attaches a relayed platform log line.
    #[inline]
    pub fn with_platform_event(mut self, event: PlatformEvent) -> Self {
        self.platform_event = Some(event);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_saturates_instead_of_wrapping() {
        let ev = Event::new(EventKind::RunStarted).with_count(3usize);
        assert_eq!(ev.count, Some(3));
        assert_eq!(ev.attempt, None);

        let huge = Event::new(EventKind::GraceExceeded).with_count(u64::MAX);
        assert_eq!(huge.count, Some(u32::MAX));
    }
}

//! # EnvironmentWatcher: drives one environment to the target version.
//!
//! ## Flow
//! ```text
//! seed cursor ── describe_events(max=1) ──► Err ─► cursor = local now
//!      │
//!      ▼
//! NotUpdated ──► update_environment_version ─┬─ Ok ───────────► Polling
//!      ▲                                      ├─ NotFound ──────► EnvironmentMissing
//!      │                                      ├─ Rejected ──────► UpdateRejected
//!      └── sleep(backoff) ◄── attempt += 1 ◄──┴─ Transient (attempt > max ⇒ AttemptsExhausted)
//!
//! Polling, every tick:
//!   1. describe_events(since=cursor) ─► cursor.admit ─► PlatformEvent per new line
//!      (failure: logged, cursor untouched, not an attempt)
//!   2. describe_environments(ids=[env])
//!        ├─ gone / NotFound  ─► EnvironmentMissing
//!        ├─ Ready, version ok ─► Succeeded           (events flushed once more)
//!        ├─ Ready, other ver. ─► VerificationFailed  (events flushed once more)
//!        ├─ other status     ─► wait poll_interval (poll budget ⇒ AttemptsExhausted)
//!        └─ Err              ─► attempt += 1, wait backoff (attempt > max ⇒ AttemptsExhausted)
//! ```
//!
//! ## Rules
//! - Calls to the platform are never interrupted; cancellation is observed
//!   before each call and while sleeping, and yields `AttemptsExhausted`.
//! - All events of one watcher are published from its own task, in order. A
//!   full bus holds the watcher back rather than losing platform log lines.
//! - Platform errors never escape: every path ends in an [`Outcome`].

mod cursor;
mod state;

pub use cursor::EventCursor;
pub use state::{Outcome, Phase, WatcherState};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::error::PlatformError;
use crate::events::{Bus, Event, EventKind};
use crate::platform::{Environment, EnvironmentFilter, PlatformClient};
use crate::policies::RetryPolicy;

/// Timing and budget parameters of a watcher.
#[derive(Clone, Copy, Debug)]
pub struct WatcherParams {
    /// Failure budget and backoff for update requests and status polls.
    pub retry: RetryPolicy,
    /// Delay between successful status polls.
    pub poll_interval: Duration,
    /// Maximum status polls after the update was accepted (`0` = unlimited).
    pub max_polls: u32,
}

impl Default for WatcherParams {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(30),
            max_polls: 120,
        }
    }
}

/// Watches a single environment through one version update.
pub struct EnvironmentWatcher {
    client: Arc<dyn PlatformClient>,
    bus: Bus,
    application: Arc<str>,
    version_label: Arc<str>,
    environment: Environment,
    params: WatcherParams,
}

enum Poll {
    Done(Outcome),
    Pending,
    Failed(PlatformError),
}

impl EnvironmentWatcher {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        bus: Bus,
        application: impl Into<Arc<str>>,
        version_label: impl Into<Arc<str>>,
        environment: Environment,
        params: WatcherParams,
    ) -> Self {
        Self {
            client,
            bus,
            application: application.into(),
            version_label: version_label.into(),
            environment,
            params,
        }
    }

    /// The environment this watcher drives.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Runs the watcher to its terminal outcome.
    pub async fn run(self, token: CancellationToken) -> Outcome {
        self.publish(
            Event::new(EventKind::WatcherStarted).with_status(self.environment.status.as_str()),
        )
        .await;

        let mut state = WatcherState::new(self.seed_cursor().await);
        let outcome = match self.request_update(&mut state, &token).await {
            Some(outcome) => outcome,
            None => self.poll_until_settled(&mut state, &token).await,
        };
        let outcome = state.finish(outcome);

        self.publish(
            Event::new(EventKind::WatcherFinished)
                .with_outcome(outcome)
                .with_count(state.polls)
                .with_reason(state.summary(&self.environment.name)),
        )
        .await;
        outcome
    }

    async fn seed_cursor(&self) -> EventCursor {
        match self
            .client
            .describe_events(&self.environment.id, None, Some(1))
            .await
        {
            Ok(events) => {
                let cursor = EventCursor::seeded(events.first());
                let at = cursor
                    .since()
                    .map_or_else(|| "empty".to_string(), |t| t.to_rfc3339());
                self.publish(Event::new(EventKind::CursorSeeded).with_reason(at))
                    .await;
                cursor
            }
            Err(e) => {
                self.publish(
                    Event::new(EventKind::EventHistoryUnavailable).with_reason(e.to_string()),
                )
                .await;
                EventCursor::starting_at(Utc::now())
            }
        }
    }

    /// Returns `None` once the update is accepted, or the terminal outcome.
    async fn request_update(
        &self,
        state: &mut WatcherState,
        token: &CancellationToken,
    ) -> Option<Outcome> {
        loop {
            if token.is_cancelled() {
                return Some(Outcome::AttemptsExhausted);
            }
            state.phase = Phase::Updating;
            self.publish(Event::new(EventKind::UpdateRequested).with_attempt(state.attempt + 1))
                .await;

            let err = match self
                .client
                .update_environment_version(&self.environment.id, &self.version_label)
                .await
            {
                Ok(()) => {
                    self.publish(
                        Event::new(EventKind::UpdateAccepted).with_attempt(state.attempt + 1),
                    )
                    .await;
                    state.updated = true;
                    state.attempt = 0;
                    state.phase = Phase::Polling;
                    return None;
                }
                Err(e) => e,
            };

            state.phase = Phase::NotUpdated;
            state.attempt += 1;
            self.publish(
                Event::new(EventKind::UpdateFailed)
                    .with_attempt(state.attempt)
                    .with_reason(err.to_string()),
            )
            .await;
            match err {
                PlatformError::NotFound { .. } => return Some(Outcome::EnvironmentMissing),
                e if !e.is_retryable() => return Some(Outcome::UpdateRejected),
                e => {
                    if !self.back_off(state, &e, token).await {
                        return Some(Outcome::AttemptsExhausted);
                    }
                }
            }
        }
    }

    async fn poll_until_settled(
        &self,
        state: &mut WatcherState,
        token: &CancellationToken,
    ) -> Outcome {
        loop {
            if token.is_cancelled() {
                return Outcome::AttemptsExhausted;
            }
            state.polls += 1;
            self.relay_events(state).await;

            match self.poll_status(state).await {
                Poll::Done(outcome) => {
                    if outcome != Outcome::EnvironmentMissing {
                        self.relay_events(state).await;
                    }
                    return outcome;
                }
                Poll::Failed(e) => {
                    if !self.back_off(state, &e, token).await {
                        return Outcome::AttemptsExhausted;
                    }
                }
                Poll::Pending => {
                    if self.params.max_polls != 0 && state.polls >= self.params.max_polls {
                        return Outcome::AttemptsExhausted;
                    }
                    if !pause(self.params.poll_interval, token).await {
                        return Outcome::AttemptsExhausted;
                    }
                }
            }
        }
    }

    async fn relay_events(&self, state: &mut WatcherState) {
        match self
            .client
            .describe_events(&self.environment.id, state.cursor.since(), None)
            .await
        {
            Ok(events) => {
                for ev in state.cursor.admit(events) {
                    self.publish(Event::new(EventKind::PlatformEvent).with_platform_event(ev))
                        .await;
                }
            }
            Err(e) => {
                self.publish(Event::new(EventKind::EventsUnavailable).with_reason(e.to_string()))
                    .await;
            }
        }
    }

    async fn poll_status(&self, state: &mut WatcherState) -> Poll {
        let filter = EnvironmentFilter::id(self.environment.id.as_str());
        let found = match self
            .client
            .describe_environments(&self.application, &filter)
            .await
        {
            Ok(envs) => envs.into_iter().find(|e| e.id == self.environment.id),
            Err(PlatformError::NotFound { .. }) => None,
            Err(e) => {
                state.attempt += 1;
                self.publish(
                    Event::new(EventKind::PollFailed)
                        .with_attempt(state.attempt)
                        .with_reason(e.to_string()),
                )
                .await;
                return Poll::Failed(e);
            }
        };

        let Some(env) = found else {
            return Poll::Done(Outcome::EnvironmentMissing);
        };
        state.attempt = 0;
        self.publish(
            Event::new(EventKind::StatusPolled)
                .with_count(state.polls)
                .with_status(env.status.as_str())
                .with_reason(env.version_label.as_str()),
        )
        .await;

        if !env.status.is_ready() {
            return Poll::Pending;
        }
        if env.version_label == *self.version_label {
            Poll::Done(Outcome::Succeeded)
        } else {
            tracing::warn!(
                environment = %self.environment.name,
                expected = %self.version_label,
                deployed = %env.version_label,
                "environment is ready on an unexpected version"
            );
            Poll::Done(Outcome::VerificationFailed)
        }
    }

    /// Sleeps the backoff delay for the current failure count.
    ///
    /// Returns `false` when the budget is exhausted or the token fires.
    async fn back_off(
        &self,
        state: &WatcherState,
        err: &PlatformError,
        token: &CancellationToken,
    ) -> bool {
        if self.params.retry.exhausted(state.attempt) {
            return false;
        }
        let delay = self.params.retry.backoff.next(state.attempt.saturating_sub(1));
        self.publish(
            Event::new(EventKind::BackoffScheduled)
                .with_attempt(state.attempt)
                .with_delay(delay)
                .with_reason(err.as_label()),
        )
        .await;
        pause(delay, token).await
    }

    async fn publish(&self, ev: Event) {
        self.bus
            .publish(ev.with_environment(self.environment.name.as_str()))
            .await;
    }
}

/// Sleeps for `d` unless cancelled first. Returns `false` on cancellation.
async fn pause(d: Duration, token: &CancellationToken) -> bool {
    let sleep = time::sleep(d);
    tokio::pin!(sleep);
    select! {
        _ = &mut sleep => true,
        _ = token.cancelled() => false,
    }
}

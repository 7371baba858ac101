use std::fmt;

use super::cursor::EventCursor;

/// Where a watcher is in its update flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No update request accepted yet.
    NotUpdated,
    /// Update request in flight.
    Updating,
    /// Request accepted; waiting for the environment to settle.
    Polling,
    /// Terminal outcome reached.
    Finished,
}

/// Terminal result of one environment watcher.
///
/// # Example
/// ```
/// use beanstalk_deployer::Outcome;
///
/// assert!(Outcome::Succeeded.is_success());
/// assert_eq!(Outcome::VerificationFailed.as_label(), "verification_failed");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Environment is `Ready` on the requested version.
    Succeeded,
    /// The platform refused the update request.
    UpdateRejected,
    /// Environment settled on a different version.
    VerificationFailed,
    /// Environment disappeared or never existed.
    EnvironmentMissing,
    /// Retry or poll budget used up, or the watcher was stopped.
    AttemptsExhausted,
}

impl Outcome {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::UpdateRejected => "update_rejected",
            Outcome::VerificationFailed => "verification_failed",
            Outcome::EnvironmentMissing => "environment_missing",
            Outcome::AttemptsExhausted => "attempts_exhausted",
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Mutable state owned by one watcher.
#[derive(Debug)]
pub struct WatcherState {
    pub phase: Phase,
    /// Consecutive failed calls in the current phase.
    pub attempt: u32,
    /// Status polls issued since the update was accepted.
    pub polls: u32,
    /// Whether the platform ever accepted the update request.
    pub updated: bool,
    pub cursor: EventCursor,
    pub outcome: Option<Outcome>,
}

impl WatcherState {
    pub fn new(cursor: EventCursor) -> Self {
        Self {
            phase: Phase::NotUpdated,
            attempt: 0,
            polls: 0,
            updated: false,
            cursor,
            outcome: None,
        }
    }

    /// Records the terminal outcome. The first outcome wins.
    pub fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.phase = Phase::Finished;
        *self.outcome.get_or_insert(outcome)
    }

    /// One-line verdict for the deployment log.
    pub fn summary(&self, environment: &str) -> String {
        let verdict = match self.outcome {
            Some(Outcome::Succeeded) => "completed successfully",
            _ if self.updated => "was updated but could not be verified",
            _ => "failed to be updated",
        };
        format!("'{environment}': {verdict}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_outcome_is_final() {
        let mut st = WatcherState::new(EventCursor::default());
        assert_eq!(st.finish(Outcome::VerificationFailed), Outcome::VerificationFailed);
        assert_eq!(st.finish(Outcome::Succeeded), Outcome::VerificationFailed);
        assert_eq!(st.phase, Phase::Finished);
    }

    #[test]
    fn summary_distinguishes_accepted_updates() {
        let mut st = WatcherState::new(EventCursor::default());
        st.finish(Outcome::AttemptsExhausted);
        assert_eq!(st.summary("api"), "'api': failed to be updated");

        let mut st = WatcherState::new(EventCursor::default());
        st.updated = true;
        st.finish(Outcome::VerificationFailed);
        assert_eq!(st.summary("api"), "'api': was updated but could not be verified");

        let mut st = WatcherState::new(EventCursor::default());
        st.updated = true;
        st.finish(Outcome::Succeeded);
        assert_eq!(st.summary("api"), "'api': completed successfully");
    }
}

//! # In-process platform.
//!
//! [`InMemoryPlatform`] keeps environments, event logs and registered
//! application versions in memory and simulates rollouts: after an accepted
//! update an environment reports `Updating` for a configurable number of status
//! polls, then `Ready` on the requested (or an overridden) version.
//!
//! Failure knobs let tests script transient errors, rejections, vanished
//! environments, environments that never settle, and panicking calls.
//! Every call is recorded in order (see [`InMemoryPlatform::calls`]).
//!
//! Timestamps come from a logical clock that advances one second per generated
//! event, so event ordering never depends on the wall clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::{Environment, EnvironmentFilter, EnvironmentStatus, PlatformClient, PlatformEvent};
use crate::error::PlatformError;

/// One call observed by [`InMemoryPlatform`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    /// Operation name (`describe_environments`, `describe_events`, ...).
    pub op: &'static str,
    /// Application name or environment id the call addressed.
    pub target: String,
}

#[derive(Default)]
struct Script {
    settle_after: u32,
    deploys_as: Option<String>,
    stuck: bool,
    update_failures: VecDeque<PlatformError>,
    /// Scripted status polls, front first: `true` fails, `false` passes.
    describes: VecDeque<bool>,
    /// Scripted event fetches, same encoding.
    event_fetches: VecDeque<bool>,
    panic_on_update: bool,
    vanish_after_update: bool,
}

struct Rollout {
    label: String,
    polls_left: u32,
}

struct Entry {
    env: Environment,
    script: Script,
    rollout: Option<Rollout>,
}

struct State {
    clock: DateTime<Utc>,
    next_id: u64,
    entries: Vec<Entry>,
    events: HashMap<String, Vec<PlatformEvent>>,
    versions: Vec<(String, String, String, String)>,
    strict_versions: bool,
    calls: Vec<RecordedCall>,
}

impl State {
    fn entry(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.env.id == id)
    }

    fn record(&mut self, op: &'static str, target: &str) {
        self.calls.push(RecordedCall {
            op,
            target: target.to_string(),
        });
    }

    fn stamp(&mut self) -> DateTime<Utc> {
        self.clock += ChronoDuration::seconds(1);
        self.clock
    }

    fn log(&mut self, id: &str, severity: &str, message: String) {
        let at = self.stamp();
        self.events
            .entry(id.to_string())
            .or_default()
            .push(PlatformEvent::new(at, severity, message));
    }
}

/// Scriptable in-memory [`PlatformClient`].
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    /// Creates an empty platform whose logical clock starts at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH + ChronoDuration::seconds(1_704_067_200);
        Self {
            state: Mutex::new(State {
                clock: epoch,
                next_id: 1,
                entries: Vec::new(),
                events: HashMap::new(),
                versions: Vec::new(),
                strict_versions: false,
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script(&self, id: &str, f: impl FnOnce(&mut Script)) {
        if let Some(entry) = self.state().entry(id) {
            f(&mut entry.script);
        }
    }

    /// Adds a `Ready` environment running version `initial` and returns its id.
    pub fn add_environment(&self, application: &str, name: &str, endpoint_url: &str) -> String {
        let mut st = self.state();
        let id = format!("e-{:06}", st.next_id);
        st.next_id += 1;
        st.entries.push(Entry {
            env: Environment {
                id: id.clone(),
                name: name.to_string(),
                application: application.to_string(),
                endpoint_url: endpoint_url.to_string(),
                version_label: "initial".to_string(),
                status: EnvironmentStatus::Ready,
            },
            script: Script::default(),
            rollout: None,
        });
        st.log(&id, "INFO", format!("createEnvironment completed for {name}"));
        id
    }

    /// Removes an environment, as if it was terminated out of band.
    pub fn remove_environment(&self, id: &str) {
        self.state().entries.retain(|e| e.env.id != id);
    }

    /// Number of status polls an update takes before the environment is `Ready`.
    pub fn set_settle_after(&self, id: &str, polls: u32) {
        self.script(id, |s| s.settle_after = polls);
    }

    /// Makes the environment settle on `label` whatever was requested.
    pub fn set_deploys_as(&self, id: &str, label: &str) {
        self.script(id, |s| s.deploys_as = Some(label.to_string()));
    }

    /// Makes the environment stay `Updating` forever after an update.
    pub fn set_stuck(&self, id: &str) {
        self.script(id, |s| s.stuck = true);
    }

    /// Fails the next `times` update requests with `err`.
    pub fn fail_next_updates(&self, id: &str, err: PlatformError, times: usize) {
        self.script(id, |s| s.update_failures.extend(std::iter::repeat_n(err, times)));
    }

    /// Fails the next `times` per-environment status polls with a transient error.
    ///
    /// Queued after any polls scripted earlier.
    pub fn fail_next_describes(&self, id: &str, times: usize) {
        self.script(id, |s| s.describes.extend(std::iter::repeat_n(true, times)));
    }

    /// Lets the next `times` scripted status polls through.
    pub fn pass_next_describes(&self, id: &str, times: usize) {
        self.script(id, |s| s.describes.extend(std::iter::repeat_n(false, times)));
    }

    /// Fails the next `times` event fetches with a transient error.
    ///
    /// Queued after any fetches scripted earlier.
    pub fn fail_next_event_fetches(&self, id: &str, times: usize) {
        self.script(id, |s| s.event_fetches.extend(std::iter::repeat_n(true, times)));
    }

    /// Lets the next `times` scripted event fetches through.
    pub fn pass_next_event_fetches(&self, id: &str, times: usize) {
        self.script(id, |s| s.event_fetches.extend(std::iter::repeat_n(false, times)));
    }

    /// Panics inside the next update request.
    pub fn panic_on_update(&self, id: &str) {
        self.script(id, |s| s.panic_on_update = true);
    }

    /// Removes the environment right after accepting the update.
    pub fn vanish_after_update(&self, id: &str) {
        self.script(id, |s| s.vanish_after_update = true);
    }

    /// Rejects updates to versions that were never registered.
    pub fn require_registered_versions(&self, strict: bool) {
        self.state().strict_versions = strict;
    }

    /// Appends an event stamped by the logical clock and returns its timestamp.
    pub fn push_event(&self, id: &str, severity: &str, message: &str) -> DateTime<Utc> {
        let mut st = self.state();
        st.log(id, severity, message.to_string());
        st.clock
    }

    /// Appends an event with an explicit timestamp.
    pub fn push_event_at(&self, id: &str, at: DateTime<Utc>, severity: &str, message: &str) {
        let mut st = self.state();
        let log = st.events.entry(id.to_string()).or_default();
        log.push(PlatformEvent::new(at, severity, message));
        log.sort_by_key(|e| e.at);
    }

    /// Current snapshot of an environment.
    pub fn environment(&self, id: &str) -> Option<Environment> {
        self.state()
            .entries
            .iter()
            .find(|e| e.env.id == id)
            .map(|e| e.env.clone())
    }

    /// Registered application versions as `(application, label, bucket, key)`.
    pub fn application_versions(&self) -> Vec<(String, String, String, String)> {
        self.state().versions.clone()
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls of `op` addressed to `target`.
    pub fn call_count(&self, op: &str, target: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.op == op && c.target == target)
            .count()
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn describe_environments(
        &self,
        application: &str,
        filter: &EnvironmentFilter,
    ) -> Result<Vec<Environment>, PlatformError> {
        let mut st = self.state();
        let polled = filter.ids.len() == 1;
        st.record(
            "describe_environments",
            if polled { &filter.ids[0] } else { application },
        );

        if polled {
            if let Some(entry) = st.entry(&filter.ids[0]) {
                if entry.script.describes.pop_front() == Some(true) {
                    return Err(PlatformError::transient("describe_environments throttled"));
                }
            }
        }

        let mut settled = Vec::new();
        let mut found = Vec::new();
        for entry in st.entries.iter_mut() {
            if entry.env.application != application || !filter.matches(&entry.env) {
                continue;
            }
            if polled && !entry.script.stuck {
                if let Some(rollout) = entry.rollout.as_mut() {
                    if rollout.polls_left == 0 {
                        entry.env.status = EnvironmentStatus::Ready;
                        entry.env.version_label = entry
                            .script
                            .deploys_as
                            .clone()
                            .unwrap_or_else(|| rollout.label.clone());
                        entry.rollout = None;
                        settled.push(entry.env.id.clone());
                    } else {
                        rollout.polls_left -= 1;
                    }
                }
            }
            found.push(entry.env.clone());
        }
        for id in settled {
            st.log(&id, "INFO", "Environment update completed successfully.".to_string());
        }
        Ok(found)
    }

    async fn describe_events(
        &self,
        environment_id: &str,
        since: Option<DateTime<Utc>>,
        max_records: Option<usize>,
    ) -> Result<Vec<PlatformEvent>, PlatformError> {
        let mut st = self.state();
        st.record("describe_events", environment_id);

        if let Some(entry) = st.entry(environment_id) {
            if entry.script.event_fetches.pop_front() == Some(true) {
                return Err(PlatformError::transient("describe_events unavailable"));
            }
        }

        let mut out: Vec<PlatformEvent> = st
            .events
            .get(environment_id)
            .map(|log| {
                log.iter()
                    .filter(|e| since.is_none_or(|s| e.at >= s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.reverse();
        if let Some(max) = max_records {
            out.truncate(max);
        }
        Ok(out)
    }

    async fn update_environment_version(
        &self,
        environment_id: &str,
        version_label: &str,
    ) -> Result<(), PlatformError> {
        let panic_requested = {
            let mut st = self.state();
            st.record("update_environment_version", environment_id);
            let strict = st.strict_versions;
            let registered = st.versions.iter().any(|v| v.1 == version_label);

            let Some(entry) = st.entry(environment_id) else {
                return Err(PlatformError::not_found(format!(
                    "No Environment found for EnvironmentId = '{environment_id}'"
                )));
            };
            if entry.script.panic_on_update {
                true
            } else {
                if let Some(err) = entry.script.update_failures.pop_front() {
                    return Err(err);
                }
                if strict && !registered {
                    return Err(PlatformError::rejected(format!(
                        "No Application Version named '{version_label}' found"
                    )));
                }
                entry.env.status = EnvironmentStatus::Updating;
                entry.rollout = Some(Rollout {
                    label: version_label.to_string(),
                    polls_left: entry.script.settle_after,
                });
                let vanish = entry.script.vanish_after_update;
                st.log(
                    environment_id,
                    "INFO",
                    format!("updateEnvironment is starting (version {version_label})."),
                );
                if vanish {
                    st.entries.retain(|e| e.env.id != environment_id);
                }
                false
            }
        };
        if panic_requested {
            panic!("platform connection dropped while updating {environment_id}");
        }
        Ok(())
    }

    async fn create_application_version(
        &self,
        application: &str,
        version_label: &str,
        bucket: &str,
        key: &str,
    ) -> Result<(), PlatformError> {
        let mut st = self.state();
        st.record("create_application_version", application);
        if st
            .versions
            .iter()
            .any(|v| v.0 == application && v.1 == version_label)
        {
            return Err(PlatformError::rejected(format!(
                "Application Version {version_label} already exists."
            )));
        }
        st.versions.push((
            application.to_string(),
            version_label.to_string(),
            bucket.to_string(),
            key.to_string(),
        ));
        Ok(())
    }
}

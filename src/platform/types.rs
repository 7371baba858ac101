use std::fmt;

use chrono::{DateTime, Utc};

/// Snapshot of a remote environment as last reported by the platform.
///
/// Identity is [`Environment::id`]; snapshots are never mutated locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    /// Platform-assigned identifier.
    pub id: String,
    /// Human-readable name, unique within the application.
    pub name: String,
    /// Owning application.
    pub application: String,
    /// Externally reachable address (CNAME).
    pub endpoint_url: String,
    /// Version label currently deployed.
    pub version_label: String,
    /// Current lifecycle status.
    pub status: EnvironmentStatus,
}

/// Lifecycle status of an environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvironmentStatus {
    Launching,
    Updating,
    Ready,
    Terminating,
    Terminated,
    /// Any status this crate does not model explicitly.
    Other(String),
}

impl EnvironmentStatus {
    /// Only `Ready` counts as stable.
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, EnvironmentStatus::Ready)
    }

    /// Parses the platform's status string (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "launching" => EnvironmentStatus::Launching,
            "updating" => EnvironmentStatus::Updating,
            "ready" => EnvironmentStatus::Ready,
            "terminating" => EnvironmentStatus::Terminating,
            "terminated" => EnvironmentStatus::Terminated,
            _ => EnvironmentStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EnvironmentStatus::Launching => "Launching",
            EnvironmentStatus::Updating => "Updating",
            EnvironmentStatus::Ready => "Ready",
            EnvironmentStatus::Terminating => "Terminating",
            EnvironmentStatus::Terminated => "Terminated",
            EnvironmentStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an environment's event log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformEvent {
    /// Platform timestamp.
    pub at: DateTime<Utc>,
    /// Severity as reported (`INFO`, `WARN`, `ERROR`, ...).
    pub severity: String,
    /// Free-form message.
    pub message: String,
}

impl PlatformEvent {
    pub fn new(at: DateTime<Utc>, severity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            at,
            severity: severity.into(),
            message: message.into(),
        }
    }
}

/// Narrows [`PlatformClient::describe_environments`](super::PlatformClient::describe_environments).
///
/// Both lists empty means "no filter".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentFilter {
    /// Exact environment names.
    pub names: Vec<String>,
    /// Exact environment ids.
    pub ids: Vec<String>,
}

impl EnvironmentFilter {
    /// Matches every environment.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches the given names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ids: Vec::new(),
        }
    }

    /// Matches a single environment id.
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            names: Vec::new(),
            ids: vec![id.into()],
        }
    }

    /// Returns `true` if `env` passes this filter.
    pub fn matches(&self, env: &Environment) -> bool {
        (self.names.is_empty() || self.names.iter().any(|n| *n == env.name))
            && (self.ids.is_empty() || self.ids.iter().any(|i| *i == env.id))
    }
}

//! # Platform client seam.
//!
//! [`PlatformClient`] is the only way the deployer talks to the remote
//! platform. Implementations must be safe for concurrent use: one handle is
//! shared read-only by every watcher of a run.
//!
//! ```text
//! EnvironmentResolver ──► describe_environments(app, filter)
//! EnvironmentWatcher  ──► describe_events(env, since, max)   (newest first)
//!                     ──► describe_environments(app, ids=[env])
//!                     ──► update_environment_version(env, label)
//! ArtifactPublisher   ──► create_application_version(app, label, bucket, key)
//! ```
//!
//! [`InMemoryPlatform`] is a scriptable in-process implementation used by the
//! test-suite and for dry runs.

mod memory;
mod types;

pub use memory::{InMemoryPlatform, RecordedCall};
pub use types::{Environment, EnvironmentFilter, EnvironmentStatus, PlatformEvent};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PlatformError;

/// Remote platform operations consumed by the deployer.
#[async_trait]
pub trait PlatformClient: Send + Sync + 'static {
    /// Lists live environments of `application` matching `filter`.
    ///
    /// An empty filter returns every environment of the application.
    async fn describe_environments(
        &self,
        application: &str,
        filter: &EnvironmentFilter,
    ) -> Result<Vec<Environment>, PlatformError>;

    /// Returns events of one environment, **newest first**.
    ///
    /// - `since`: only events at or after this instant (inclusive, platform clock);
    /// - `max_records`: cap on the number of returned events.
    async fn describe_events(
        &self,
        environment_id: &str,
        since: Option<DateTime<Utc>>,
        max_records: Option<usize>,
    ) -> Result<Vec<PlatformEvent>, PlatformError>;

    /// Asks the platform to deploy `version_label` to the environment.
    ///
    /// Returns once the request is accepted; the rollout itself is asynchronous.
    async fn update_environment_version(
        &self,
        environment_id: &str,
        version_label: &str,
    ) -> Result<(), PlatformError>;

    /// Registers an uploaded bundle as a deployable application version,
    /// creating the application if needed.
    async fn create_application_version(
        &self,
        application: &str,
        version_label: &str,
        bucket: &str,
        key: &str,
    ) -> Result<(), PlatformError>;
}

//! # beanstalk-deployer
//!
//! **beanstalk-deployer** publishes an application bundle and rolls it out to
//! the environments of a platform-as-a-service application (Elastic Beanstalk
//! style), as one step of a CI pipeline.
//!
//! A run uploads the bundle to object storage, registers it as an application
//! version, then updates every selected environment concurrently. A watcher
//! per environment issues the update, tails the environment's event log and
//! polls until the environment settles. The per-environment outcomes are
//! folded into a single verdict.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                        DeployConfig (TOML + BEANSTALK_DEPLOY_* env)
//!                                       │
//!                                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Deployer                                                         │
//! │  - ClientFactory (platform client, buckets per region/credentials)│
//! │  - EventPipeline (Bus ─► SubscriberSet ─► LogWriter, custom)      │
//! │  - Setup::apply for every configured setup                        │
//! └──────┬───────────────────────────────────────────────┬────────────┘
//!        ▼                                               ▼
//!  ┌───────────────────────────┐          ┌──────────────────────────────┐
//!  │ s3 extension              │          │ UpdateOrchestrator           │
//!  │ Packager ─► PackagedArt.  │          │ EnvironmentResolver (lookups)│
//!  │ ArtifactPublisher         │          │ Semaphore + JoinSet          │
//!  │  (SHA-256 dedup, key fmt) │          │ deadline / grace             │
//!  │ create_application_version│          └──────┬──────────┬────────────┘
//!  └───────────────────────────┘                 ▼          ▼
//!                                  ┌────────────────┐  ┌────────────────┐
//!                                  │ Environment-   │  │ Environment-   │ ...
//!                                  │ Watcher (env1) │  │ Watcher (env2) │
//!                                  │ update ─► poll │  │ update ─► poll │
//!                                  │ EventCursor    │  │ EventCursor    │
//!                                  └───────┬────────┘  └───────┬────────┘
//!                                          │ publish(Event)    │
//!                                          ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (bounded mpsc channel)                 │
//! │              (capacity: OrchestratorConfig::bus_capacity)         │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                            SubscriberSet (per-sub queues)
//!                          ┌─────────┼─────────┐
//!                          ▼         ▼         ▼
//!                     LogWriter   custom1   customN
//! ```
//!
//! ### Verdict
//! ```text
//! per environment: Succeeded | UpdateRejected | VerificationFailed
//!                  | EnvironmentMissing | AttemptsExhausted
//! all_succeeded = AND(outcome == Succeeded)        (false without environments)
//! success       = all_succeeded || !fail_on_error  (!fail_on_error without environments)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                            |
//! |-------------------|--------------------------------------------------------------|-----------------------------------------------|
//! | **Deployment**    | Validate configuration, apply setups, report the verdict.    | [`Deployer`], [`DeployReport`]                |
//! | **Orchestration** | Concurrent, bounded environment updates.                     | [`UpdateOrchestrator`], [`UpdateTarget`]      |
//! | **Watching**      | Per-environment update/poll state machine.                   | [`EnvironmentWatcher`], [`Outcome`]           |
//! | **Platform**      | Remote platform seam and an in-memory implementation.        | [`PlatformClient`], [`InMemoryPlatform`]      |
//! | **Resolution**    | Select environments by name or endpoint URL.                 | [`EnvironmentLookup`], [`EnvironmentResolver`]|
//! | **Artifacts**     | Package, deduplicate and publish bundles.                    | [`Packager`], [`ArtifactPublisher`]           |
//! | **Subscriber API**| Hook into deployment events.                                 | [`Subscribe`], [`LogWriter`]                  |
//! | **Policies**      | Retry budget and backoff between failed calls.               | [`RetryPolicy`], [`BackoffPolicy`]            |
//! | **Errors**        | Typed platform and deployment errors.                        | [`PlatformError`], [`DeployError`]            |
//! | **Configuration** | Versioned TOML documents with a legacy upgrade path.         | [`DeployConfig`], [`OrchestratorConfig`]      |
//!
//! ## Optional features
//! - `aws`: exposes `s3_bucket`, an S3-backed `object_store` for [`ClientFactory`] implementations.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use beanstalk_deployer::{
//!     BuildVariables, DeployConfig, Deployer, InMemoryClients, InMemoryPlatform, Outcome,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform = Arc::new(InMemoryPlatform::new());
//!     let prod = platform.add_environment("shop", "shop-prod", "shop.example.com");
//!
//!     let config = DeployConfig::from_toml_str(r#"
//!         [orchestrator]
//!         poll_interval = "10ms"
//!
//!         [[credentials]]
//!         name = "ci"
//!         access_key_id = "AKIAEXAMPLE"
//!         secret_access_key = "secret"
//!
//!         [[setups]]
//!         type = "elastic_beanstalk"
//!         application_name = "shop"
//!         version_label_format = "shop-${BUILD_NUMBER}"
//!         fail_on_error = true
//!
//!         [[setups.env_lookup]]
//!         type = "by_name"
//!         names = "shop-prod"
//!     "#)?;
//!
//!     let report = Deployer::builder(Arc::new(InMemoryClients::new(platform.clone())))
//!         .with_variables(Arc::new(BuildVariables::new().with("BUILD_NUMBER", "42")))
//!         .build()
//!         .deploy(&config)
//!         .await?;
//!
//!     assert!(report.success);
//!     assert_eq!(report.outcomes[&prod].outcome, Outcome::Succeeded);
//!     assert_eq!(platform.environment(&prod).unwrap().version_label, "shop-42");
//!     Ok(())
//! }
//! ```

mod artifact;
pub mod config;
mod deploy;
mod error;
mod events;
mod observability;
mod orchestrator;
mod platform;
mod policies;
mod resolver;
mod setup;
mod subscribers;
mod substitution;
mod watcher;

// ---- Public re-exports ----

pub use artifact::{
    ArchivePackager, ArtifactPublisher, FileFilter, GlobSet, ObjectStorePublisher,
    PackagedArtifact, Packager, PublishRequest, PublishedArtifact, object_key,
};
pub use config::{Credentials, DeployConfig};
pub use deploy::{ClientFactory, DeployReport, Deployer, DeployerBuilder, InMemoryClients};
pub use error::{DeployError, DeployResult, PlatformError};
pub use events::{Bus, Event, EventKind, EventPipeline};
pub use observability::{LogFormat, init_tracing};
pub use orchestrator::{
    EnvironmentReport, OrchestratorConfig, RunSummary, UpdateOrchestrator, UpdateTarget,
    cancel_on_signal, wait_for_shutdown_signal,
};
pub use platform::{
    Environment, EnvironmentFilter, EnvironmentStatus, InMemoryPlatform, PlatformClient,
    PlatformEvent, RecordedCall,
};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use resolver::{
    ByName, ByUrl, EnvironmentLookup, EnvironmentResolver, NameList, ResolveContext, resolve_all,
};
pub use setup::{ElasticBeanstalkSetup, S3Setup, Setup, SetupContext, SetupReport};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use substitution::{BuildVariables, Substitute, resolve_list, resolve_value};
pub use watcher::{EnvironmentWatcher, EventCursor, Outcome, Phase, WatcherParams, WatcherState};

// Optional: S3 buckets through object_store's AWS builder.
// Enable with: `--features aws`
#[cfg(feature = "aws")]
pub use artifact::s3_bucket;

//! # Deployer: the caller-facing entry point.
//!
//! [`Deployer::deploy`] validates a [`DeployConfig`], starts the event
//! pipeline, applies every setup in order and folds their results into one
//! [`DeployReport`].
//!
//! ```text
//! Deployer::deploy(config)
//!   ├─ config.validate()                     (Configuration errors, no remote call)
//!   ├─ EventPipeline::start(LogWriter + subscribers)
//!   ├─ for setup in config.setups:
//!   │     Setup::apply(ctx) ─► SetupReport{artifact, RunSummary}
//!   ├─ pipeline.close()                       (flush subscribers)
//!   └─ DeployReport{success = AND(summary.success), outcomes, artifact}
//! ```
//!
//! Clients are created per run through a [`ClientFactory`]; there is no global
//! credential registry.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use beanstalk_deployer::{DeployConfig, Deployer, InMemoryClients, InMemoryPlatform};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform = Arc::new(InMemoryPlatform::new());
//!     platform.add_environment("shop", "shop-prod", "shop.example.com");
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
//!         version_label_format = "shop-1"
//!     "#)?;
//!
//!     let deployer = Deployer::builder(Arc::new(InMemoryClients::new(platform))).build();
//!     let report = deployer.deploy(&config).await?;
//!     assert!(report.success);
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::memory::InMemory;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifact::{ArchivePackager, Packager, PublishedArtifact};
use crate::config::{Credentials, DeployConfig};
use crate::error::{DeployError, DeployResult};
use crate::events::{Bus, EventPipeline};
use crate::observability::init_tracing;
use crate::orchestrator::{EnvironmentReport, cancel_on_signal};
use crate::platform::{InMemoryPlatform, PlatformClient};
use crate::setup::SetupContext;
use crate::subscribers::{LogWriter, Subscribe};
use crate::substitution::{BuildVariables, Substitute};

/// Creates the remote clients of a run.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Platform client for `region`.
    async fn connect(
        &self,
        region: &str,
        credentials: &Credentials,
    ) -> DeployResult<Arc<dyn PlatformClient>>;

    /// Object store addressing `bucket`.
    async fn bucket(
        &self,
        region: &str,
        credentials: &Credentials,
        bucket: &str,
    ) -> DeployResult<Arc<dyn ObjectStore>>;
}

/// [`ClientFactory`] handing out one [`InMemoryPlatform`] and in-memory buckets.
pub struct InMemoryClients {
    platform: Arc<InMemoryPlatform>,
    buckets: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl InMemoryClients {
    pub fn new(platform: Arc<InMemoryPlatform>) -> Self {
        Self {
            platform,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn platform(&self) -> &Arc<InMemoryPlatform> {
        &self.platform
    }

    /// The store behind `bucket`, created empty on first use.
    pub fn bucket_store(&self, bucket: &str) -> Arc<InMemory> {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()))
            .clone()
    }
}

#[async_trait]
impl ClientFactory for InMemoryClients {
    async fn connect(
        &self,
        _region: &str,
        _credentials: &Credentials,
    ) -> DeployResult<Arc<dyn PlatformClient>> {
        Ok(self.platform.clone())
    }

    async fn bucket(
        &self,
        _region: &str,
        _credentials: &Credentials,
        bucket: &str,
    ) -> DeployResult<Arc<dyn ObjectStore>> {
        Ok(self.bucket_store(bucket))
    }
}

/// Verdict of a deployment.
#[derive(Clone, Debug, Default)]
pub struct DeployReport {
    /// The single pass/fail answer.
    pub success: bool,
    /// Per-environment results keyed by environment id.
    pub outcomes: BTreeMap<String, EnvironmentReport>,
    /// Last bundle published, if any setup published one.
    pub artifact: Option<PublishedArtifact>,
}

impl DeployReport {
    /// Environments that did not end `Succeeded`.
    pub fn failed(&self) -> impl Iterator<Item = &EnvironmentReport> {
        self.outcomes.values().filter(|r| !r.outcome.is_success())
    }
}

/// Builder for [`Deployer`].
pub struct DeployerBuilder {
    clients: Arc<dyn ClientFactory>,
    packager: Arc<dyn Packager>,
    vars: Arc<dyn Substitute>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl DeployerBuilder {
    /// Starts from the default packager, the process environment as build
    /// variables, and no extra subscriber.
    pub fn new(clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients,
            packager: Arc::new(ArchivePackager),
            vars: Arc::new(BuildVariables::from_env()),
            subscribers: Vec::new(),
        }
    }

    pub fn with_packager(mut self, packager: Arc<dyn Packager>) -> Self {
        self.packager = packager;
        self
    }

    /// Sets the build-variable resolution used for every configured string.
    pub fn with_variables(mut self, vars: Arc<dyn Substitute>) -> Self {
        self.vars = vars;
        self
    }

    /// Adds event subscribers next to the built-in [`LogWriter`].
    ///
    /// Each one gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn build(self) -> Deployer {
        Deployer {
            clients: self.clients,
            packager: self.packager,
            vars: self.vars,
            subscribers: self.subscribers,
        }
    }
}

/// Runs deployments described by [`DeployConfig`]s.
pub struct Deployer {
    clients: Arc<dyn ClientFactory>,
    packager: Arc<dyn Packager>,
    vars: Arc<dyn Substitute>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Deployer {
    pub fn builder(clients: Arc<dyn ClientFactory>) -> DeployerBuilder {
        DeployerBuilder::new(clients)
    }

    /// Runs every setup of `config` to completion.
    pub async fn deploy(&self, config: &DeployConfig) -> DeployResult<DeployReport> {
        self.deploy_with_token(config, &CancellationToken::new()).await
    }

    /// Like [`Deployer::deploy`], stopping watchers on SIGINT/SIGTERM/Ctrl-C.
    pub async fn deploy_until_signal(&self, config: &DeployConfig) -> DeployResult<DeployReport> {
        let token = CancellationToken::new();
        let listener = cancel_on_signal(token.clone());
        let result = self.deploy_with_token(config, &token).await;
        listener.abort();
        result
    }

    /// Runs every setup; cancelling `token` stops outstanding watchers.
    pub async fn deploy_with_token(
        &self,
        config: &DeployConfig,
        token: &CancellationToken,
    ) -> DeployResult<DeployReport> {
        config.validate()?;
        if config.setups.is_empty() {
            return Err(DeployError::config("no setup configured"));
        }
        if let Some(format) = config.log_format {
            init_tracing(format);
        }

        let mut subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
        subscribers.extend(self.subscribers.iter().cloned());
        let pipeline =
            EventPipeline::start(config.orchestrator.bus_capacity_clamped(), subscribers);

        let result = self.apply_setups(config, pipeline.bus(), token).await;
        pipeline.close().await;

        match &result {
            Ok(report) if report.success => info!("deployment succeeded"),
            Ok(report) => warn!(failed = report.failed().count(), "deployment failed"),
            Err(e) => warn!(error = %e.as_message(), label = e.as_label(), "deployment aborted"),
        }
        result
    }

    async fn apply_setups(
        &self,
        config: &DeployConfig,
        bus: Bus,
        token: &CancellationToken,
    ) -> DeployResult<DeployReport> {
        let ctx = SetupContext {
            config,
            clients: self.clients.as_ref(),
            packager: self.packager.as_ref(),
            vars: self.vars.as_ref(),
            bus: &bus,
            token,
        };

        let mut report = DeployReport {
            success: true,
            ..DeployReport::default()
        };
        for setup in &config.setups {
            let applied = setup.apply(&ctx).await?;
            report.success &= applied.summary.success;
            for env in applied.summary.reports {
                report.outcomes.insert(env.id.clone(), env);
            }
            if applied.artifact.is_some() {
                report.artifact = applied.artifact;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use object_store::path::Path as ObjectPath;
    use tempfile::TempDir;

    use super::*;
    use crate::events::{Event, EventKind};
    use crate::watcher::Outcome;

    const CREDENTIALS: &str = r#"
        [orchestrator]
        poll_interval = 1

        [[credentials]]
        name = "ci"
        access_key_id = "AKIAEXAMPLE"
        secret_access_key = "secret"
    "#;

    fn config(workspace: &std::path::Path, setup: &str) -> DeployConfig {
        let mut cfg = DeployConfig::from_toml_str(&format!("{CREDENTIALS}\n{setup}")).unwrap();
        cfg.workspace = workspace.to_path_buf();
        cfg
    }

    fn deployer(clients: &Arc<InMemoryClients>) -> Deployer {
        Deployer::builder(clients.clone())
            .with_variables(Arc::new(BuildVariables::new().with("BUILD_NUMBER", "42")))
            .build()
    }

    #[derive(Default)]
    struct Finished(AtomicUsize);

    #[async_trait]
    impl Subscribe for Finished {
        async fn on_event(&self, ev: &Event) {
            if ev.kind == EventKind::WatcherFinished {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn name(&self) -> &'static str {
            "finished"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_then_updates_every_environment() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("target")).unwrap();
        std::fs::write(ws.path().join("target/shop.war"), "war-bytes").unwrap();

        let platform = Arc::new(InMemoryPlatform::new());
        platform.require_registered_versions(true);
        for name in ["shop-prod", "shop-qa", "shop-dev"] {
            let id = platform.add_environment("shop", name, &format!("{name}.example.com"));
            platform.set_settle_after(&id, 2);
        }
        let clients = Arc::new(InMemoryClients::new(platform.clone()));
        let finished = Arc::new(Finished::default());

        let cfg = config(
            ws.path(),
            r#"
            [[setups]]
            type = "elastic_beanstalk"
            credentials = "ci"
            application_name = "shop"
            version_label_format = "shop-${BUILD_NUMBER}"
            fail_on_error = true

            [[setups.extensions]]
            type = "s3"
            bucket_name = "artifacts"
            key_prefix = "builds/"
            root_object = "target/shop.war"
            "#,
        );

        let report = Deployer::builder(clients.clone())
            .with_variables(Arc::new(BuildVariables::new().with("BUILD_NUMBER", "42")))
            .with_subscribers(vec![finished.clone()])
            .build()
            .deploy(&cfg)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes.values().all(|r| r.outcome == Outcome::Succeeded));
        assert_eq!(finished.0.load(Ordering::SeqCst), 3);

        let artifact = report.artifact.unwrap();
        assert_eq!(artifact.key, "builds/shop-shop-42.zip");
        assert!(artifact.uploaded);
        let stored = clients
            .bucket_store("artifacts")
            .get(&ObjectPath::from("builds/shop-shop-42.zip"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), b"war-bytes");

        for env in platform.calls().iter().filter(|c| c.op == "update_environment_version") {
            let env = platform.environment(&env.target).unwrap();
            assert_eq!(env.version_label, "shop-42");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fail_on_error_decides_the_verdict() {
        let ws = TempDir::new().unwrap();
        let platform = Arc::new(InMemoryPlatform::new());
        platform.add_environment("shop", "shop-prod", "shop.example.com");
        let drifting = platform.add_environment("shop", "shop-qa", "qa.example.com");
        platform.set_deploys_as(&drifting, "shop-41");
        let clients = Arc::new(InMemoryClients::new(platform));

        for (fail_on_error, expected) in [(true, false), (false, true)] {
            let cfg = config(
                ws.path(),
                &format!(
                    r#"
                    [[setups]]
                    type = "elastic_beanstalk"
                    application_name = "shop"
                    version_label_format = "shop-${{BUILD_NUMBER}}"
                    fail_on_error = {fail_on_error}
                    "#
                ),
            );
            let report = deployer(&clients).deploy(&cfg).await.unwrap();
            assert_eq!(report.success, expected);
            assert_eq!(
                report.outcomes[&drifting].outcome,
                Outcome::VerificationFailed
            );
            assert_eq!(report.failed().count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_matching_environment_follows_fail_on_error() {
        let ws = TempDir::new().unwrap();
        let platform = Arc::new(InMemoryPlatform::new());
        platform.add_environment("shop", "shop-prod", "shop.example.com");
        let clients = Arc::new(InMemoryClients::new(platform));

        let cfg = config(
            ws.path(),
            r#"
            [[setups]]
            type = "elastic_beanstalk"
            application_name = "shop"
            version_label_format = "v1"
            fail_on_error = true

            [[setups.env_lookup]]
            type = "by_name"
            names = "shop-staging"
            "#,
        );
        let report = deployer(&clients).deploy(&cfg).await.unwrap();
        assert!(!report.success);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn configuration_errors_precede_remote_calls() {
        let ws = TempDir::new().unwrap();
        let platform = Arc::new(InMemoryPlatform::new());
        let clients = Arc::new(InMemoryClients::new(platform.clone()));

        for setup in [
            r#"
            [[setups]]
            type = "elastic_beanstalk"
            credentials = "nobody"
            application_name = "shop"
            version_label_format = "v1"
            "#,
            r#"
            [[setups]]
            type = "elastic_beanstalk"
            region = "not a region"
            application_name = "shop"
            version_label_format = "v1"
            "#,
            r#"
            [[setups]]
            type = "elastic_beanstalk"
            application_name = " / "
            version_label_format = "v1"
            "#,
        ] {
            let err = deployer(&clients)
                .deploy(&config(ws.path(), setup))
                .await
                .unwrap_err();
            assert_eq!(err.as_label(), "deploy_configuration", "{setup}");
        }

        let err = deployer(&clients)
            .deploy(&DeployConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "deploy_configuration");
        assert!(platform.calls().is_empty());
    }
}

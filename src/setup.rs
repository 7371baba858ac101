//! # Setups: the steps of a deployment.
//!
//! A [`Setup`] is one configured step. Only `elastic_beanstalk` setups run at
//! the top level; `s3` setups are extensions of them and publish the bundle
//! before the environments are updated.
//!
//! ```text
//! ElasticBeanstalkSetup::apply
//!   ├─ substitute application, version label, region
//!   ├─ ClientFactory::connect(region, credentials)
//!   ├─ for s3 extension: package ─► publish ─► create_application_version
//!   └─ UpdateOrchestrator::resolve_and_run(app, env_lookup, label, fail_on_error)
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};

use crate::artifact::{
    ArtifactPublisher, FileFilter, ObjectStorePublisher, Packager, PublishRequest,
    PublishedArtifact,
};
use crate::config::{Credentials, DeployConfig};
use crate::deploy::ClientFactory;
use crate::error::{DeployError, DeployResult};
use crate::events::Bus;
use crate::observability::setup_span;
use crate::orchestrator::{RunSummary, UpdateOrchestrator};
use crate::platform::PlatformClient;
use crate::resolver::{ByName, EnvironmentLookup};
use crate::substitution::{Substitute, is_valid_environment_name, resolve_value};

/// Region used when a setup leaves it blank.
pub const DEFAULT_REGION: &str = "us-west-1";

/// Shared inputs of every setup of a run.
pub struct SetupContext<'a> {
    pub config: &'a DeployConfig,
    pub clients: &'a dyn ClientFactory,
    pub packager: &'a dyn Packager,
    pub vars: &'a dyn Substitute,
    pub bus: &'a Bus,
    pub token: &'a CancellationToken,
}

/// What one applied setup produced.
#[derive(Clone, Debug)]
pub struct SetupReport {
    pub application: String,
    pub version_label: String,
    pub artifact: Option<PublishedArtifact>,
    pub summary: RunSummary,
}

/// One configured deployment step.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Setup {
    S3(S3Setup),
    ElasticBeanstalk(ElasticBeanstalkSetup),
}

impl Setup {
    /// Static checks of a top-level setup.
    pub fn validate(&self) -> DeployResult<()> {
        match self {
            Setup::S3(_) => Err(DeployError::config(
                "an s3 setup must be an extension of an elastic_beanstalk setup",
            )),
            Setup::ElasticBeanstalk(eb) => eb.validate(),
        }
    }

    /// Runs a top-level setup.
    pub async fn apply(&self, ctx: &SetupContext<'_>) -> DeployResult<SetupReport> {
        match self {
            Setup::S3(_) => Err(DeployError::config("an s3 setup cannot run on its own")),
            Setup::ElasticBeanstalk(eb) => eb.apply(ctx).await,
        }
    }
}

/// Publishes the bundle to a bucket and registers the application version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct S3Setup {
    pub bucket_name: String,
    pub key_prefix: String,
    /// File or directory relative to the workspace.
    pub root_object: String,
    /// Comma-separated patterns of files to ship from a directory (empty = all).
    pub includes: String,
    /// Comma-separated patterns of files to leave out.
    pub excludes: String,
    pub overwrite_existing_file: bool,
}

impl S3Setup {
    async fn publish(
        &self,
        ctx: &SetupContext<'_>,
        region: &str,
        credentials: &Credentials,
        platform: Arc<dyn PlatformClient>,
        application: &str,
        version_label: &str,
    ) -> DeployResult<PublishedArtifact> {
        let bucket = resolve_value(ctx.vars, &self.bucket_name);
        if bucket.is_empty() {
            return Err(DeployError::config("s3 setup has no bucket name"));
        }
        let key_prefix = resolve_value(ctx.vars, &self.key_prefix);
        let root = bundle_root(&ctx.config.workspace, &resolve_value(ctx.vars, &self.root_object));
        let filter = FileFilter::new(
            &ctx.vars.substitute(&self.includes),
            &ctx.vars.substitute(&self.excludes),
        )?;

        let store = ctx.clients.bucket(region, credentials, &bucket).await?;
        let artifact = ctx.packager.package(&root, &filter).await?;

        ObjectStorePublisher::new(store, bucket, platform)
            .publish(PublishRequest {
                application,
                version_label,
                key_prefix: &key_prefix,
                artifact: &artifact,
                overwrite: self.overwrite_existing_file,
            })
            .await
    }
}

/// Rolls a version out to the environments of one application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElasticBeanstalkSetup {
    /// Region name, may reference build variables (blank = `us-west-1`).
    pub region: String,
    /// Name of an entry of `DeployConfig::credentials`.
    pub credentials: String,
    pub application_name: String,
    pub version_label_format: String,
    /// Any environment not ending `Succeeded` fails the run.
    pub fail_on_error: bool,
    /// Steps run before the update (`s3` only).
    pub extensions: Vec<Setup>,
    /// Environment lookups, unioned (empty = every environment).
    pub env_lookup: Vec<EnvironmentLookup>,
}

impl ElasticBeanstalkSetup {
    fn validate(&self) -> DeployResult<()> {
        let mut s3 = 0;
        for ext in &self.extensions {
            match ext {
                Setup::S3(_) => s3 += 1,
                Setup::ElasticBeanstalk(_) => {
                    return Err(DeployError::config(
                        "elastic_beanstalk setups cannot be nested",
                    ));
                }
            }
        }
        if s3 > 1 {
            return Err(DeployError::config(
                "at most one s3 extension per elastic_beanstalk setup",
            ));
        }
        for lookup in &self.env_lookup {
            if let EnvironmentLookup::ByName(by_name) = lookup {
                for name in by_name.names.0.iter().map(|n| n.trim()) {
                    if !name.is_empty() && !is_valid_environment_name(name) {
                        warn!(environment = name, "environment name looks invalid");
                    }
                }
            }
        }
        Ok(())
    }

    /// Region after substitution, checked for the `xx-name-N` shape.
    pub fn resolved_region(&self, vars: &dyn Substitute) -> DeployResult<String> {
        let region = resolve_value(vars, &self.region);
        if region.is_empty() {
            return Ok(DEFAULT_REGION.to_string());
        }
        if is_region_name(&region) {
            Ok(region)
        } else {
            Err(DeployError::config(format!("invalid region '{region}'")))
        }
    }

    async fn apply(&self, ctx: &SetupContext<'_>) -> DeployResult<SetupReport> {
        let application = resolve_value(ctx.vars, &self.application_name);
        if application.is_empty() {
            return Err(DeployError::config("application name is blank"));
        }
        let version_label = resolve_value(ctx.vars, &self.version_label_format);
        if version_label.is_empty() {
            return Err(DeployError::config("version label is blank"));
        }
        let region = self.resolved_region(ctx.vars)?;
        let credentials = ctx
            .config
            .credentials_named(&ctx.vars.substitute(&self.credentials))?;

        self.deploy(ctx, &application, &version_label, &region, credentials)
            .instrument(setup_span("elastic_beanstalk", &application))
            .await
    }

    async fn deploy(
        &self,
        ctx: &SetupContext<'_>,
        application: &str,
        version_label: &str,
        region: &str,
        credentials: &Credentials,
    ) -> DeployResult<SetupReport> {
        let client = ctx.clients.connect(region, credentials).await?;
        info!(region = %region, version = %version_label, "deploying");

        let mut artifact = None;
        for ext in &self.extensions {
            if let Setup::S3(s3) = ext {
                let published = s3
                    .publish(
                        ctx,
                        region,
                        credentials,
                        client.clone(),
                        application,
                        version_label,
                    )
                    .await?;
                artifact = Some(published);
            }
        }

        let default_lookup;
        let lookups = if self.env_lookup.is_empty() {
            default_lookup = [EnvironmentLookup::ByName(ByName::all())];
            &default_lookup[..]
        } else {
            &self.env_lookup[..]
        };

        let orchestrator =
            UpdateOrchestrator::new(ctx.config.orchestrator.clone(), client, ctx.bus.clone());
        let summary = orchestrator
            .resolve_and_run(
                application,
                lookups,
                ctx.vars,
                version_label,
                self.fail_on_error,
                ctx.token,
            )
            .await?;

        Ok(SetupReport {
            application: application.to_string(),
            version_label: version_label.to_string(),
            artifact,
            summary,
        })
    }
}

fn bundle_root(workspace: &Path, root_object: &str) -> std::path::PathBuf {
    if root_object.is_empty() {
        workspace.to_path_buf()
    } else {
        workspace.join(root_object)
    }
}

fn is_region_name(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    let Some((last, head)) = parts.split_last() else {
        return false;
    };
    head.len() >= 2
        && head
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_lowercase()))
        && !last.is_empty()
        && last.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substitution::BuildVariables;

    #[test]
    fn regions_are_substituted_and_checked() {
        let vars = BuildVariables::new().with("REGION", "eu-central-1");
        let mut eb = ElasticBeanstalkSetup::default();
        assert_eq!(eb.resolved_region(&vars).unwrap(), DEFAULT_REGION);

        eb.region = "${REGION}".into();
        assert_eq!(eb.resolved_region(&vars).unwrap(), "eu-central-1");

        eb.region = "us-gov-west-1".into();
        assert!(eb.resolved_region(&vars).is_ok());

        eb.region = "moon-base".into();
        assert_eq!(
            eb.resolved_region(&vars).unwrap_err().as_label(),
            "deploy_configuration"
        );
    }

    #[test]
    fn nesting_rules() {
        assert!(Setup::S3(S3Setup::default()).validate().is_err());

        let nested = ElasticBeanstalkSetup {
            extensions: vec![Setup::ElasticBeanstalk(ElasticBeanstalkSetup::default())],
            ..Default::default()
        };
        assert!(Setup::ElasticBeanstalk(nested).validate().is_err());

        let two_buckets = ElasticBeanstalkSetup {
            extensions: vec![
                Setup::S3(S3Setup::default()),
                Setup::S3(S3Setup::default()),
            ],
            ..Default::default()
        };
        assert!(Setup::ElasticBeanstalk(two_buckets).validate().is_err());

        let fine = ElasticBeanstalkSetup {
            extensions: vec![Setup::S3(S3Setup::default())],
            ..Default::default()
        };
        assert!(Setup::ElasticBeanstalk(fine).validate().is_ok());
    }

    #[test]
    fn bundle_root_defaults_to_workspace() {
        let ws = Path::new("/build");
        assert_eq!(bundle_root(ws, ""), Path::new("/build"));
        assert_eq!(bundle_root(ws, "target/app.war"), Path::new("/build/target/app.war"));
    }
}

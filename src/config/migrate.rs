//! Upgrade of the legacy flat layout (`version = 1`).
//!
//! Version 1 documents held one application per file with every field at the
//! top level:
//!
//! ```toml
//! version = 1
//! region = "us-east-1"
//! credentials_name = "ci"
//! application_name = "shop"
//! environments = ["shop-prod", "shop-qa"]
//! version_label_format = "shop-${BUILD_NUMBER}"
//! bucket_name = "artifacts"
//! key_prefix = "builds"
//! root_object = "target/shop.war"
//! ```
//!
//! They become one `elastic_beanstalk` setup carrying an `s3` extension (when a
//! bucket or key prefix was set) and a `by_name` lookup over `environments`.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use super::{CURRENT_VERSION, Credentials, DeployConfig};
use crate::observability::LogFormat;
use crate::orchestrator::OrchestratorConfig;
use crate::resolver::{ByName, EnvironmentLookup, NameList};
use crate::setup::{ElasticBeanstalkSetup, S3Setup, Setup};

/// Legacy flat document.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    pub workspace: Option<PathBuf>,
    pub credentials: Vec<Credentials>,
    pub orchestrator: OrchestratorConfig,
    pub log_format: Option<LogFormat>,

    pub region: String,
    pub credentials_name: String,
    pub application_name: String,
    pub environments: NameList,
    pub version_label_format: String,
    pub bucket_name: String,
    pub key_prefix: String,
    pub root_object: String,
    pub includes: String,
    pub excludes: String,
    pub overwrite_existing_file: bool,
    pub fail_on_error: Option<bool>,
}

/// Converts a legacy document into the current layout.
///
/// Nothing application-specific set means no setup at all.
pub fn upgrade(old: LegacyConfig) -> DeployConfig {
    let has_application = !old.application_name.trim().is_empty()
        || !old.version_label_format.trim().is_empty()
        || old.environments.0.iter().any(|e| !e.trim().is_empty());

    let mut setups = Vec::new();
    if has_application {
        let mut extensions = Vec::new();
        if !old.bucket_name.trim().is_empty() || !old.key_prefix.trim().is_empty() {
            extensions.push(Setup::S3(S3Setup {
                bucket_name: old.bucket_name,
                key_prefix: old.key_prefix,
                root_object: old.root_object,
                includes: old.includes,
                excludes: old.excludes,
                overwrite_existing_file: old.overwrite_existing_file,
            }));
        }

        setups.push(Setup::ElasticBeanstalk(ElasticBeanstalkSetup {
            region: old.region,
            credentials: old.credentials_name,
            application_name: old.application_name,
            version_label_format: old.version_label_format,
            fail_on_error: old.fail_on_error.unwrap_or(false),
            extensions,
            env_lookup: vec![EnvironmentLookup::ByName(ByName {
                names: old.environments,
            })],
        }));
    }

    info!(setups = setups.len(), "upgraded legacy configuration");
    DeployConfig {
        version: CURRENT_VERSION,
        workspace: old.workspace.unwrap_or_else(|| PathBuf::from(".")),
        credentials: old.credentials,
        orchestrator: old.orchestrator,
        log_format: old.log_format,
        setups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_document_becomes_setup_with_extension() {
        let cfg = DeployConfig::from_toml_str(
            r#"
            version = 1
            region = "us-east-1"
            application_name = "shop"
            environments = ["shop-prod", "shop-qa"]
            version_label_format = "shop-${BUILD_NUMBER}"
            bucket_name = "artifacts"
            key_prefix = "builds"
            root_object = "target/shop.war"
            overwrite_existing_file = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.version, CURRENT_VERSION);
        assert_eq!(cfg.setups.len(), 1);
        let Setup::ElasticBeanstalk(eb) = &cfg.setups[0] else {
            panic!("expected an elastic_beanstalk setup");
        };
        assert_eq!(eb.application_name, "shop");
        assert_eq!(eb.region, "us-east-1");
        assert!(!eb.fail_on_error);
        assert_eq!(
            eb.env_lookup,
            vec![EnvironmentLookup::ByName(ByName::new(["shop-prod", "shop-qa"]))]
        );
        let [Setup::S3(s3)] = eb.extensions.as_slice() else {
            panic!("expected one s3 extension");
        };
        assert_eq!(s3.bucket_name, "artifacts");
        assert!(s3.overwrite_existing_file);
    }

    #[test]
    fn unversioned_flat_document_is_detected() {
        let cfg = DeployConfig::from_toml_str(
            r#"
            application_name = "shop"
            fail_on_error = true
            "#,
        )
        .unwrap();
        let Setup::ElasticBeanstalk(eb) = &cfg.setups[0] else {
            panic!("expected an elastic_beanstalk setup");
        };
        assert!(eb.fail_on_error);
        assert!(eb.extensions.is_empty());
    }

    #[test]
    fn empty_legacy_document_has_no_setup() {
        let cfg = upgrade(LegacyConfig::default());
        assert!(cfg.setups.is_empty());
        assert_eq!(cfg.workspace, PathBuf::from("."));
    }
}

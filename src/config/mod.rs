//! # Deployment configuration.
//!
//! [`DeployConfig`] is loaded once per run from a TOML document, then
//! overridden by `BEANSTALK_DEPLOY_` environment variables (`__` separates
//! nested keys, e.g. `BEANSTALK_DEPLOY_ORCHESTRATOR__MAX_CONCURRENT=2`).
//!
//! ```toml
//! version = 2
//! workspace = "."
//!
//! [[credentials]]
//! name = "ci"
//! access_key_id = "AKIA..."
//! secret_access_key = "..."
//!
//! [orchestrator]
//! max_concurrent = 5
//! poll_interval = "30s"
//!
//! [[setups]]
//! type = "elastic_beanstalk"
//! region = "eu-west-1"
//! credentials = "ci"
//! application_name = "shop"
//! version_label_format = "shop-${BUILD_NUMBER}"
//! fail_on_error = true
//!
//!   [[setups.extensions]]
//!   type = "s3"
//!   bucket_name = "artifacts"
//!   key_prefix = "builds/shop"
//!   root_object = "target/shop.war"
//!
//!   [[setups.env_lookup]]
//!   type = "by_name"
//!   names = "shop-prod"
//! ```
//!
//! Documents written for the legacy flat layout (`version = 1`, or no version
//! with top-level `application_name`) are upgraded by [`migrate::upgrade`].

pub mod migrate;

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::error::{DeployError, DeployResult};
use crate::observability::LogFormat;
use crate::orchestrator::OrchestratorConfig;
use crate::setup::Setup;

/// Current document version.
pub const CURRENT_VERSION: u32 = 2;

const ENV_PREFIX: &str = "BEANSTALK_DEPLOY_";
const DEFAULT_FILE: &str = "beanstalk-deploy.toml";

/// Top-level configuration of a deployment run.
#[derive(Clone, Debug, Deserialize)]
pub struct DeployConfig {
    /// Document version, see [`CURRENT_VERSION`].
    #[serde(default = "current_version")]
    pub version: u32,

    /// Directory bundle paths are relative to.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Named credentials referenced by setups.
    #[serde(default)]
    pub credentials: Vec<Credentials>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Installs a global tracing subscriber in this format when set.
    #[serde(default)]
    pub log_format: Option<LogFormat>,

    /// Applied in order.
    #[serde(default)]
    pub setups: Vec<Setup>,
}

const fn current_version() -> u32 {
    CURRENT_VERSION
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            workspace: default_workspace(),
            credentials: Vec::new(),
            orchestrator: OrchestratorConfig::default(),
            log_format: None,
            setups: Vec::new(),
        }
    }
}

impl DeployConfig {
    /// Loads `beanstalk-deploy.toml` from the current directory (if present)
    /// and the `BEANSTALK_DEPLOY_` environment.
    pub fn load() -> DeployResult<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(DEFAULT_FILE))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Loads a specific TOML file, then the `BEANSTALK_DEPLOY_` environment.
    pub fn from_file(path: impl AsRef<Path>) -> DeployResult<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Parses a TOML document without consulting the environment.
    pub fn from_toml_str(raw: &str) -> DeployResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(raw)))
    }

    /// Extracts a configuration from any figment, upgrading legacy documents.
    pub fn from_figment(figment: Figment) -> DeployResult<Self> {
        let version = figment.extract_inner::<u32>("version").ok();
        let legacy = match version {
            Some(1) => true,
            Some(CURRENT_VERSION) => false,
            Some(other) => {
                return Err(DeployError::config(format!(
                    "unsupported configuration version {other}"
                )));
            }
            None => figment.contains("application_name"),
        };

        let cfg = if legacy {
            let old: migrate::LegacyConfig = figment.extract().map_err(config_error)?;
            migrate::upgrade(old)
        } else {
            figment.extract::<DeployConfig>().map_err(config_error)?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks what can be checked before variables are substituted.
    pub fn validate(&self) -> DeployResult<()> {
        if self.version != CURRENT_VERSION {
            return Err(DeployError::config(format!(
                "unsupported configuration version {}",
                self.version
            )));
        }
        for (i, cred) in self.credentials.iter().enumerate() {
            if self.credentials[..i].iter().any(|c| c.name == cred.name) {
                return Err(DeployError::config(format!(
                    "credentials '{}' defined twice",
                    cred.name
                )));
            }
        }
        for setup in &self.setups {
            setup.validate()?;
        }
        Ok(())
    }

    /// Picks credentials by name. A blank name selects the only entry, if any.
    pub fn credentials_named(&self, name: &str) -> DeployResult<&Credentials> {
        let name = name.trim();
        if name.is_empty() {
            return match self.credentials.as_slice() {
                [only] => Ok(only),
                [] => Err(DeployError::config("no credentials configured")),
                _ => Err(DeployError::config(
                    "several credentials configured, the setup must name one",
                )),
            };
        }
        self.credentials
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DeployError::config(format!("no credentials named '{name}'")))
    }
}

fn config_error(e: figment::Error) -> DeployError {
    DeployError::Configuration(e.to_string())
}

/// Static access key pair.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Serde helper for durations written as integer seconds (`30`) or as a
/// humantime string (`"500ms"`, `"30s"`, `"2m"`, `"1h 30m"`).
pub mod duration {
    use std::time::Duration;

    use serde::de::{Deserialize, Deserializer, Error};

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(#[serde(with = "humantime_serde")] Duration),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer) {
            Ok(Raw::Seconds(secs)) => Ok(Duration::from_secs(secs)),
            Ok(Raw::Text(d)) => Ok(d),
            Err(_) => Err(D::Error::custom(
                "expected seconds or a duration such as \"500ms\", \"30s\", \"2m\"",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::setup::Setup;

    fn poll_interval(raw: &str) -> DeployResult<Duration> {
        DeployConfig::from_toml_str(&format!("[orchestrator]\npoll_interval = {raw}"))
            .map(|cfg| cfg.orchestrator.poll_interval)
    }

    #[test]
    fn durations_accept_seconds_and_humantime() {
        assert_eq!(poll_interval("7").unwrap(), Duration::from_secs(7));
        assert_eq!(poll_interval("\"500ms\"").unwrap(), Duration::from_millis(500));
        assert_eq!(poll_interval("\"2m\"").unwrap(), Duration::from_secs(120));
        assert_eq!(poll_interval("\"1h 30m\"").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn malformed_durations_are_configuration_errors() {
        for raw in ["\"1e30s\"", "\"99999999999999999999s\"", "\"soon\"", "-1", "1.5"] {
            let err = poll_interval(raw).unwrap_err();
            assert_eq!(err.as_label(), "deploy_configuration", "{raw}");
        }
    }

    #[test]
    fn full_document_loads() {
        let cfg = DeployConfig::from_toml_str(
            r#"
            version = 2
            workspace = "/build"

            [[credentials]]
            name = "ci"
            access_key_id = "AKIAEXAMPLE"
            secret_access_key = "secret"

            [orchestrator]
            max_concurrent = 2
            poll_interval = 10

            [[setups]]
            type = "elastic_beanstalk"
            region = "eu-west-1"
            credentials = "ci"
            application_name = "shop"
            version_label_format = "shop-${BUILD_NUMBER}"
            fail_on_error = true

            [[setups.extensions]]
            type = "s3"
            bucket_name = "artifacts"
            key_prefix = "builds"
            root_object = "target/shop.war"

            [[setups.env_lookup]]
            type = "by_url"
            urls = ["shop.example.com"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.workspace, PathBuf::from("/build"));
        assert_eq!(cfg.orchestrator.max_concurrent, 2);
        assert_eq!(cfg.orchestrator.poll_interval, Duration::from_secs(10));
        assert_eq!(cfg.credentials_named("ci").unwrap().access_key_id, "AKIAEXAMPLE");
        let Setup::ElasticBeanstalk(eb) = &cfg.setups[0] else {
            panic!("expected an elastic_beanstalk setup");
        };
        assert!(eb.fail_on_error);
        assert_eq!(eb.extensions.len(), 1);
        assert_eq!(eb.env_lookup.len(), 1);
    }

    #[test]
    fn unknown_version_and_top_level_s3_are_rejected() {
        let err = DeployConfig::from_toml_str("version = 9").unwrap_err();
        assert_eq!(err.as_label(), "deploy_configuration");

        let err = DeployConfig::from_toml_str(
            r#"
            [[setups]]
            type = "s3"
            bucket_name = "artifacts"
            "#,
        )
        .unwrap_err();
        assert_eq!(err.as_label(), "deploy_configuration");
    }

    #[test]
    fn credentials_selection() {
        let one = Credentials {
            name: "ci".into(),
            access_key_id: "a".into(),
            secret_access_key: "s".into(),
        };
        let mut cfg = DeployConfig {
            credentials: vec![one.clone()],
            ..DeployConfig::default()
        };
        assert_eq!(cfg.credentials_named("").unwrap().name, "ci");
        assert!(cfg.credentials_named("other").is_err());

        cfg.credentials.push(Credentials {
            name: "prod".into(),
            ..one
        });
        assert!(cfg.credentials_named("").is_err());
        assert_eq!(cfg.credentials_named("prod").unwrap().name, "prod");
        assert!(!format!("{:?}", cfg.credentials[0]).contains("\"s\""));
    }
}

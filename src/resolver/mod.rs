//! # Environment resolution.
//!
//! Maps a symbolic lookup to the concrete environments of an application.
//! Lookups are data ([`EnvironmentLookup`]) chosen in the configuration; each
//! variant implements [`EnvironmentResolver`].
//!
//! ```toml
//! [[setups.env_lookup]]
//! type = "by_name"
//! names = "shop-prod\nshop-${STAGE}"
//!
//! [[setups.env_lookup]]
//! type = "by_url"
//! urls = ["shop.example.com"]
//! ```
//!
//! Several lookups are unioned in declaration order, deduplicated by id
//! ([`resolve_all`]). Zero matches is not an error.

mod by_name;
mod by_url;

pub use by_name::ByName;
pub use by_url::ByUrl;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PlatformError;
use crate::platform::{Environment, PlatformClient};
use crate::substitution::Substitute;

/// What a resolver may use: the platform and the build variables.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub client: &'a dyn PlatformClient,
    pub vars: &'a dyn Substitute,
}

/// Resolves environments of one application.
#[async_trait]
pub trait EnvironmentResolver: Send + Sync {
    async fn resolve(
        &self,
        application: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<Vec<Environment>, PlatformError>;
}

/// Configured lookup strategy.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvironmentLookup {
    ByName(ByName),
    ByUrl(ByUrl),
}

#[async_trait]
impl EnvironmentResolver for EnvironmentLookup {
    async fn resolve(
        &self,
        application: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<Vec<Environment>, PlatformError> {
        match self {
            EnvironmentLookup::ByName(l) => l.resolve(application, ctx).await,
            EnvironmentLookup::ByUrl(l) => l.resolve(application, ctx).await,
        }
    }
}

/// Runs every lookup and returns the union, first occurrence wins.
pub async fn resolve_all(
    lookups: &[EnvironmentLookup],
    application: &str,
    ctx: &ResolveContext<'_>,
) -> Result<Vec<Environment>, PlatformError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for lookup in lookups {
        for env in lookup.resolve(application, ctx).await? {
            if seen.insert(env.id.clone()) {
                out.push(env);
            }
        }
    }
    Ok(out)
}

/// List of raw entries, written either as a TOML array or as one
/// newline-separated string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameList(pub Vec<String>);

impl NameList {
    /// Splits a newline-separated string.
    pub fn from_lines(raw: &str) -> Self {
        Self(raw.lines().map(str::to_string).collect())
    }
}

impl<'de> Deserialize<'de> for NameList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Lines(String),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Lines(raw) => NameList::from_lines(&raw),
            Raw::List(list) => NameList(list),
        })
    }
}

use async_trait::async_trait;
use serde::Deserialize;

use super::{EnvironmentResolver, NameList, ResolveContext};
use crate::error::PlatformError;
use crate::platform::{Environment, EnvironmentFilter};
use crate::substitution::resolve_list;

/// Selects environments by exact name.
///
/// Entries are substituted and stripped; blank entries are ignored. An empty
/// list selects every environment of the application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ByName {
    #[serde(default)]
    pub names: NameList,
}

impl ByName {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: NameList(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Lookup matching every environment.
    pub fn all() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnvironmentResolver for ByName {
    async fn resolve(
        &self,
        application: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<Vec<Environment>, PlatformError> {
        let names = resolve_list(ctx.vars, &self.names.0);
        ctx.client
            .describe_environments(application, &EnvironmentFilter::names(names))
            .await
    }
}

use async_trait::async_trait;
use serde::Deserialize;

use super::{EnvironmentResolver, NameList, ResolveContext};
use crate::error::PlatformError;
use crate::platform::{Environment, EnvironmentFilter};
use crate::substitution::resolve_list;

/// Selects environments whose endpoint URL is in the (substituted) list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ByUrl {
    #[serde(default)]
    pub urls: NameList,
}

impl ByUrl {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: NameList(urls.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl EnvironmentResolver for ByUrl {
    async fn resolve(
        &self,
        application: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<Vec<Environment>, PlatformError> {
        let urls = resolve_list(ctx.vars, &self.urls.0);
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let all = ctx
            .client
            .describe_environments(application, &EnvironmentFilter::all())
            .await?;
        Ok(all
            .into_iter()
            .filter(|env| urls.iter().any(|u| *u == env.endpoint_url))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;
    use crate::substitution::BuildVariables;

    #[tokio::test]
    async fn matches_substituted_urls() {
        let p = InMemoryPlatform::new();
        p.add_environment("shop", "shop-prod", "shop.example.com");
        p.add_environment("shop", "shop-qa", "qa.shop.example.com");
        let vars = BuildVariables::new().with("HOST", "qa.shop.example.com");
        let ctx = ResolveContext {
            client: &p,
            vars: &vars,
        };

        let envs = ByUrl::new(["${HOST}", "unknown.example.com"])
            .resolve("shop", &ctx)
            .await
            .unwrap();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].name, "shop-qa");
    }

    #[tokio::test]
    async fn empty_list_matches_nothing() {
        let p = InMemoryPlatform::new();
        p.add_environment("shop", "shop-prod", "shop.example.com");
        let vars = BuildVariables::new();
        let ctx = ResolveContext {
            client: &p,
            vars: &vars,
        };
        assert!(ByUrl::default().resolve("shop", &ctx).await.unwrap().is_empty());
        assert!(p.calls().is_empty());
    }
}

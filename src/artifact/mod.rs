//! # Artifact publishing.
//!
//! Turns a workspace path into a deployable application version:
//!
//! ```text
//! workspace path ──► Packager ──► PackagedArtifact (file or zipped dir)
//!                                       │
//!                                       ▼
//!                  ArtifactPublisher::publish(PublishRequest)
//!                     ├─ object key = {prefix}/{app}-{label}.zip
//!                     ├─ skip upload when the stored object has the same SHA-256
//!                     └─ create_application_version(app, label, bucket, key)
//! ```

mod glob;
mod package;
mod store;

pub use glob::{FileFilter, GlobSet};
pub use package::{ArchivePackager, PackagedArtifact, Packager};
pub use store::ObjectStorePublisher;

#[cfg(feature = "aws")]
pub use store::s3_bucket;

use async_trait::async_trait;

use crate::error::DeployResult;
use crate::substitution::strip;

/// Inputs of one publication.
#[derive(Debug)]
pub struct PublishRequest<'a> {
    pub application: &'a str,
    pub version_label: &'a str,
    pub key_prefix: &'a str,
    pub artifact: &'a PackagedArtifact,
    /// Upload even when an identical object is already stored.
    pub overwrite: bool,
}

impl PublishRequest<'_> {
    pub fn object_key(&self) -> String {
        object_key(self.key_prefix, self.application, self.version_label)
    }
}

/// Where a bundle ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub bucket: String,
    pub key: String,
    /// `false` when an identical object was already stored.
    pub uploaded: bool,
    /// Hex SHA-256 of the bundle.
    pub sha256: String,
}

/// Uploads a bundle and registers it as an application version.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(&self, request: PublishRequest<'_>) -> DeployResult<PublishedArtifact>;
}

/// Builds `{prefix}/{application}-{label}.zip` with runs of `/` collapsed and
/// leading/trailing slashes removed.
pub fn object_key(prefix: &str, application: &str, label: &str) -> String {
    let raw = format!("{prefix}/{application}-{label}.zip");
    let mut collapsed = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    strip(&collapsed).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_collapses_slashes() {
        assert_eq!(
            object_key("builds//shop/", "shop", "v7"),
            "builds/shop/shop-v7.zip"
        );
        assert_eq!(object_key("", "shop", "v7"), "shop-v7.zip");
        assert_eq!(object_key("/", "shop", "1.0-42"), "shop-1.0-42.zip");
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{ArtifactPublisher, PublishRequest, PublishedArtifact};
use crate::error::{DeployError, DeployResult};
use crate::platform::PlatformClient;

/// [`ArtifactPublisher`] writing to one `object_store` bucket.
pub struct ObjectStorePublisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    platform: Arc<dyn PlatformClient>,
}

impl ObjectStorePublisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            platform,
        }
    }

    /// Hash of the stored object, `None` when there is nothing (readable) at `key`.
    async fn stored_hash(&self, key: &ObjectPath) -> DeployResult<Option<String>> {
        match self.store.head(key).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. })
            | Err(object_store::Error::PermissionDenied { .. }) => return Ok(None),
            Err(e) => {
                return Err(DeployError::Storage(format!("failed to check {key}: {e}")));
            }
        }

        let data = self
            .store
            .get(key)
            .await
            .map_err(|e| DeployError::Storage(format!("failed to read {key}: {e}")))?
            .bytes()
            .await
            .map_err(|e| DeployError::Storage(format!("failed to read {key}: {e}")))?;
        Ok(Some(sha256_hex(&data)))
    }
}

#[async_trait]
impl ArtifactPublisher for ObjectStorePublisher {
    async fn publish(&self, request: PublishRequest<'_>) -> DeployResult<PublishedArtifact> {
        let key = request.object_key();
        let location = ObjectPath::from(key.as_str());

        let data = tokio::fs::read(request.artifact.path()).await?;
        let sha256 = sha256_hex(&data);

        let unchanged = match self.stored_hash(&location).await? {
            Some(stored) => stored == sha256,
            None => false,
        };

        let uploaded = if unchanged && !request.overwrite {
            info!(bucket = %self.bucket, key = %key, "identical bundle already stored, skipping upload");
            false
        } else {
            debug!(bucket = %self.bucket, key = %key, size = data.len(), "uploading bundle");
            self.store
                .put(&location, Bytes::from(data).into())
                .await
                .map_err(|e| DeployError::Storage(format!("failed to upload {key}: {e}")))?;
            info!(bucket = %self.bucket, key = %key, "bundle uploaded");
            true
        };

        self.platform
            .create_application_version(
                request.application,
                request.version_label,
                &self.bucket,
                &key,
            )
            .await?;
        info!(
            application = request.application,
            version = request.version_label,
            "application version registered"
        );

        Ok(PublishedArtifact {
            bucket: self.bucket.clone(),
            key,
            uploaded,
            sha256,
        })
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Opens an S3 bucket with static credentials.
#[cfg(feature = "aws")]
pub fn s3_bucket(
    region: &str,
    access_key_id: &str,
    secret_access_key: &str,
    bucket: &str,
) -> DeployResult<Arc<dyn ObjectStore>> {
    let store = object_store::aws::AmazonS3Builder::new()
        .with_region(region)
        .with_bucket_name(bucket)
        .with_access_key_id(access_key_id)
        .with_secret_access_key(secret_access_key)
        .build()
        .map_err(|e| DeployError::Storage(format!("failed to open bucket {bucket}: {e}")))?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    use super::*;
    use crate::artifact::PackagedArtifact;
    use crate::platform::InMemoryPlatform;

    struct Fixture {
        _dir: TempDir,
        bundle: PackagedArtifact,
        store: Arc<InMemory>,
        platform: Arc<InMemoryPlatform>,
    }

    fn fixture(content: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.zip");
        std::fs::write(&path, content).unwrap();
        Fixture {
            bundle: PackagedArtifact::existing(path),
            _dir: dir,
            store: Arc::new(InMemory::new()),
            platform: Arc::new(InMemoryPlatform::new()),
        }
    }

    fn request<'a>(f: &'a Fixture, label: &'a str, overwrite: bool) -> PublishRequest<'a> {
        PublishRequest {
            application: "shop",
            version_label: label,
            key_prefix: "builds",
            artifact: &f.bundle,
            overwrite,
        }
    }

    fn publisher(f: &Fixture) -> ObjectStorePublisher {
        ObjectStorePublisher::new(f.store.clone(), "artifacts", f.platform.clone())
    }

    #[tokio::test]
    async fn uploads_and_registers_version() {
        let f = fixture("bundle-v1");
        let out = publisher(&f).publish(request(&f, "v1", false)).await.unwrap();

        assert!(out.uploaded);
        assert_eq!(out.key, "builds/shop-v1.zip");
        assert_eq!(out.sha256, sha256_hex(b"bundle-v1"));

        let stored = f
            .store
            .get(&ObjectPath::from("builds/shop-v1.zip"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), b"bundle-v1");
        assert_eq!(
            f.platform.application_versions(),
            vec![(
                "shop".to_string(),
                "v1".to_string(),
                "artifacts".to_string(),
                "builds/shop-v1.zip".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn identical_object_is_not_uploaded_again() {
        let f = fixture("same-bytes");
        let location = ObjectPath::from("builds/shop-v2.zip");
        f.store
            .put(&location, Bytes::from_static(b"same-bytes").into())
            .await
            .unwrap();
        let before = f.store.head(&location).await.unwrap();

        let out = publisher(&f).publish(request(&f, "v2", false)).await.unwrap();

        assert!(!out.uploaded);
        assert_eq!(out.key, "builds/shop-v2.zip");
        let after = f.store.head(&location).await.unwrap();
        assert_eq!(before.e_tag, after.e_tag);
        assert_eq!(f.platform.application_versions().len(), 1);
    }

    #[tokio::test]
    async fn overwrite_or_changed_content_uploads() {
        let f = fixture("same-bytes");
        let location = ObjectPath::from("builds/shop-v3.zip");
        f.store
            .put(&location, Bytes::from_static(b"same-bytes").into())
            .await
            .unwrap();
        let out = publisher(&f).publish(request(&f, "v3", true)).await.unwrap();
        assert!(out.uploaded);

        let f = fixture("new-bytes");
        f.store
            .put(&location, Bytes::from_static(b"old-bytes").into())
            .await
            .unwrap();
        let out = publisher(&f).publish(request(&f, "v3", false)).await.unwrap();
        assert!(out.uploaded);
        let stored = f.store.get(&location).await.unwrap().bytes().await.unwrap();
        assert_eq!(stored.as_ref(), b"new-bytes");
    }

    #[tokio::test]
    async fn registration_failure_is_reported() {
        let f = fixture("bundle");
        let p = publisher(&f);
        p.publish(request(&f, "v4", false)).await.unwrap();

        let err = p.publish(request(&f, "v4", false)).await.unwrap_err();
        assert_eq!(err.as_label(), "deploy_platform");
    }
}

//! External media storage used by the expiry cleanup
//!
//! Uses OpenDAL for unified S3-compatible access.

use async_trait::async_trait;
use opendal::{services::S3, Operator};

use crate::config::StorageConfig;
use crate::Result;

/// Object store holding story media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Delete the object stored under `media_key`. Deleting a missing object
    /// succeeds.
    async fn delete_object(&self, media_key: &str) -> Result<()>;
}

/// S3-compatible media store
pub struct OpendalMediaStore {
    operator: Operator,
}

impl OpendalMediaStore {
    /// Build the S3 operator from configuration
    pub fn new(config: &StorageConfig) -> Result<Self> {
        tracing::info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            "Initializing media storage"
        );

        let mut builder = S3::default()
            .endpoint(&config.endpoint)
            .bucket(&config.bucket)
            .root(&config.root)
            .access_key_id(&config.access_key_id)
            .secret_access_key(&config.secret_access_key);

        if let Some(region) = &config.region {
            builder = builder.region(region);
        }

        let operator = Operator::new(builder)?.finish();

        Ok(Self { operator })
    }
}

#[async_trait]
impl MediaStore for OpendalMediaStore {
    async fn delete_object(&self, media_key: &str) -> Result<()> {
        self.operator.delete(media_key).await?;
        tracing::trace!(media_key = %media_key, "Deleted media object");
        Ok(())
    }
}

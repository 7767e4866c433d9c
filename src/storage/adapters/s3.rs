//! S3 artifact store
//!
//! Objects live under `s3://<bucket>/<prefix>/<key>`.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

use crate::error::{ExecutorError, Result};
use crate::storage::{ArtifactLocation, ArtifactStore};

pub struct S3ArtifactStore {
    client: S3Client,
    bucket: String,
    location: ArtifactLocation,
}

impl S3ArtifactStore {
    /// Create a store for `location`, which must be a bucket location
    pub fn new(client: S3Client, location: ArtifactLocation) -> Result<Self> {
        let bucket = match &location {
            ArtifactLocation::Bucket { bucket, .. } => bucket.clone(),
            ArtifactLocation::SharedPath(path) => {
                return Err(ExecutorError::ConfigurationError(format!(
                    "S3 store cannot use filesystem location {}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            client,
            bucket,
            location,
        })
    }

    /// Build a client from the ambient AWS configuration
    pub async fn from_env(location: ArtifactLocation) -> Result<Self> {
        let config = aws_config::load_from_env().await;
        Self::new(S3Client::new(&config), location)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// True when the error is S3 saying the key does not exist
fn is_missing_key<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ServiceError(service) => {
            matches!(service.err().code(), Some("NoSuchKey") | Some("NotFound"))
        }
        _ => false,
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let object_key = self.location.object_key(key);
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes))
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| {
                ExecutorError::StorageError(format!(
                    "failed to upload s3://{}/{}: {}",
                    self.bucket, object_key, e
                ))
            })?;

        debug!(bucket = %self.bucket, key = %object_key, bytes = size, "Uploaded artifact");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let object_key = self.location.object_key(key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                if is_missing_key(&e) {
                    ExecutorError::ArtifactNotFound(self.location_for(key))
                } else {
                    ExecutorError::StorageError(format!(
                        "failed to download s3://{}/{}: {}",
                        self.bucket, object_key, e
                    ))
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| {
                ExecutorError::StorageError(format!(
                    "failed to read body of s3://{}/{}: {}",
                    self.bucket, object_key, e
                ))
            })?
            .into_bytes()
            .to_vec();

        debug!(bucket = %self.bucket, key = %object_key, bytes = bytes.len(), "Downloaded artifact");
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let object_key = self.location.object_key(key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                ExecutorError::StorageError(format!(
                    "failed to delete s3://{}/{}: {}",
                    self.bucket, object_key, e
                ))
            })?;

        Ok(())
    }

    fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

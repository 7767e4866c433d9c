use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::storage::{
    ArtifactLocation, ArtifactStore, FilesystemArtifactStore, S3ArtifactStore,
};

/// Selects the artifact store backend from the configured location string
pub struct ArtifactStoreFactory;

impl ArtifactStoreFactory {
    /// Create the store for `location`.
    ///
    /// A malformed location fails with `ConfigurationError` before any
    /// client is created.
    pub async fn create_store(location: &str) -> Result<Arc<dyn ArtifactStore>> {
        match ArtifactLocation::parse(location)? {
            ArtifactLocation::SharedPath(root) => {
                info!(root = %root.display(), "Creating shared-path artifact store");
                Ok(Arc::new(FilesystemArtifactStore::new(root)))
            }
            bucket @ ArtifactLocation::Bucket { .. } => {
                info!(location = %bucket, "Creating S3 artifact store");
                Ok(Arc::new(S3ArtifactStore::from_env(bucket).await?))
            }
        }
    }
}

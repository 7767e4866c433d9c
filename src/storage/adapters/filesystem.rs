//! Shared-directory artifact store
//!
//! Artifacts are plain files in a directory that the worker container sees
//! through a host-path mount at the same path.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ExecutorError, Result};
use crate::storage::{ArtifactLocation, ArtifactStore};

pub struct FilesystemArtifactStore {
    root: PathBuf,
    location: ArtifactLocation,
}

impl FilesystemArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            location: ArtifactLocation::SharedPath(root.clone()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
            return Err(ExecutorError::StorageError(format!(
                "invalid artifact key '{}'",
                key
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            ExecutorError::StorageError(format!(
                "failed to create artifact directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        // Readers only ever see complete files.
        let partial = self.root.join(format!(".{}.partial", key));
        tokio::fs::write(&partial, &bytes).await.map_err(|e| {
            ExecutorError::StorageError(format!("failed to write {}: {}", partial.display(), e))
        })?;
        tokio::fs::rename(&partial, &path).await.map_err(|e| {
            ExecutorError::StorageError(format!("failed to move {} into place: {}", key, e))
        })?;

        debug!(key = key, bytes = bytes.len(), path = %path.display(), "Stored artifact");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(key = key, bytes = bytes.len(), "Loaded artifact");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ExecutorError::ArtifactNotFound(self.location_for(key)))
            }
            Err(e) => Err(ExecutorError::StorageError(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExecutorError::StorageError(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

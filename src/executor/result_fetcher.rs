//! Result retrieval after a successful job

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::entities::RunId;
use crate::error::{ExecutorError, Result};
use crate::executor::TaskSerializer;
use crate::storage::ArtifactStore;

pub struct ResultFetcher {
    store: Arc<dyn ArtifactStore>,
    serializer: Arc<dyn TaskSerializer>,
    cache_dir: PathBuf,
}

impl ResultFetcher {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        serializer: Arc<dyn TaskSerializer>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            serializer,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_path(&self, run_id: &RunId) -> PathBuf {
        self.cache_dir.join(run_id.result_key())
    }

    /// Download, cache and deserialize the result of `run_id`.
    ///
    /// The cached copy is removed only once it deserialized; a corrupt
    /// payload stays on disk for inspection.
    pub async fn fetch(&self, run_id: &RunId) -> Result<Value> {
        let key = run_id.result_key();
        let bytes = self.store.get(&key).await.map_err(|e| match e {
            ExecutorError::ArtifactNotFound(_) => ExecutorError::ResultUnavailable(format!(
                "{} has no result at {}",
                run_id,
                self.store.location_for(&key)
            )),
            other => other,
        })?;
        debug!(run_id = %run_id, bytes = bytes.len(), "Downloaded result");

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let cache_path = self.cache_path(run_id);
        tokio::fs::write(&cache_path, &bytes).await?;

        let value = self.serializer.deserialize_result(&bytes)?;

        if let Err(e) = tokio::fs::remove_file(&cache_path).await {
            warn!(path = %cache_path.display(), error = %e, "Failed to remove cached result");
        }
        info!(run_id = %run_id, serializer = self.serializer.name(), "Result retrieved");
        Ok(value)
    }
}

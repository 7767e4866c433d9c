use async_trait::async_trait;

use crate::error::Result;
use crate::storage::ArtifactLocation;

/// Byte storage shared between the submitter and the worker container.
///
/// The same store carries the task payload towards the worker and the
/// result back; direction does not matter to the interface.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fetch the bytes under `key`.
    ///
    /// Fails with `ArtifactNotFound` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Where this store keeps its artifacts
    fn location(&self) -> &ArtifactLocation;

    /// URI of `key` in this store
    fn location_for(&self, key: &str) -> String {
        self.location().uri_for(key)
    }

    /// Backend name, for logs
    fn backend_name(&self) -> &'static str;
}

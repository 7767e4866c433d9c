use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::{ExecutorError, Result};

/// Username/password pair for `docker login`
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read a TOML file with top-level `username` and `password` keys.
    ///
    /// The file is read at publish time, so every failure is a `PublishError`.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ExecutorError::PublishError(format!(
                "failed to read registry credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            ExecutorError::PublishError(format!(
                "invalid registry credentials file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login material issued by a managed registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRegistryLogin {
    /// Registry host to log in to and push under, without scheme
    pub endpoint: String,
    pub credentials: RegistryCredentials,
}

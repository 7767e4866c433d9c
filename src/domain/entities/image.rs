//! Container image entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pull policy written into the job's container spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePullPolicy {
    /// Never pull, the image must already be in the node's cache
    Never,
    /// Leave the field unset and let the cluster apply its default
    ClusterDefault,
}

impl ImagePullPolicy {
    /// Value for `imagePullPolicy`, `None` when the field is left unset
    pub fn as_k8s_value(&self) -> Option<String> {
        match self {
            ImagePullPolicy::Never => Some("Never".to_string()),
            ImagePullPolicy::ClusterDefault => None,
        }
    }
}

/// Image built locally for one run, not yet published anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub repository: String,
    pub tag: String,
}

impl ImageHandle {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// `<repository>:<tag>` as known to the local build client
    pub fn local_name(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Final image coordinate used by the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host (and optional path); `None` for a bare local tag
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn local(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            registry: None,
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    pub fn remote(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: Some(registry.into()),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    pub fn is_bare(&self) -> bool {
        self.registry.is_none()
    }

    pub fn pull_policy(&self) -> ImagePullPolicy {
        if self.is_bare() {
            ImagePullPolicy::Never
        } else {
            ImagePullPolicy::ClusterDefault
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.registry {
            Some(registry) => write!(f, "{}/{}:{}", registry, self.repository, self.tag),
            None => write!(f, "{}:{}", self.repository, self.tag),
        }
    }
}

//! Seams to the external systems the executor drives
//!
//! Each trait has one production implementation in this module tree and is
//! replaced by recording doubles in tests.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job as K8sJob, JobStatus as K8sJobStatus};
use std::path::Path;

use crate::error::Result;
use crate::registry::{ManagedRegistryLogin, RegistryCredentials};

/// Container build client plus the local cluster's image loader
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build `tag` from `context_dir` using the build file at `build_file`.
    ///
    /// A non-zero exit is an `ImageBuildError`.
    async fn build_image(&self, context_dir: &Path, build_file: &Path, tag: &str) -> Result<()>;

    async fn tag_image(&self, source: &str, target: &str) -> Result<()>;

    async fn login(&self, registry: &str, credentials: &RegistryCredentials) -> Result<()>;

    async fn push_image(&self, image: &str) -> Result<()>;

    /// Load a local image straight into a single-node cluster's image cache
    async fn load_into_local_cluster(&self, image: &str) -> Result<()>;
}

/// Short-lived credentials for a managed registry.
///
/// `credentials_file` replaces the provider's default shared credentials
/// file when set.
#[async_trait]
pub trait RegistryCredentialProvider: Send + Sync {
    async fn managed_login(
        &self,
        registry: &str,
        credentials_file: Option<&Path>,
    ) -> Result<ManagedRegistryLogin>;
}

/// The batch API calls the executor needs
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create `job`; rejection is a `SubmissionError`
    async fn create_job(&self, namespace: &str, job: &K8sJob) -> Result<()>;

    /// Read the status subresource of a job.
    ///
    /// A job without status yet returns the default (empty) status.
    async fn read_job_status(&self, namespace: &str, name: &str) -> Result<K8sJobStatus>;

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;
}

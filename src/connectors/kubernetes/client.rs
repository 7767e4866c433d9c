//! Cluster client creation and the batch API implementation

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job as K8sJob, JobStatus as K8sJobStatus};
use kube::{
    api::{DeleteParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connectors::ClusterApi;
use crate::error::{ExecutorError, Result};

/// Builds cluster clients from an explicit kubeconfig file and context.
///
/// Nothing is read from process-global state; two executors with different
/// kubeconfigs can live in the same process.
pub struct ClusterClientFactory;

impl ClusterClientFactory {
    pub async fn create(kubeconfig_path: &Path, context: &str) -> Result<Arc<dyn ClusterApi>> {
        let kubeconfig = Kubeconfig::read_from(kubeconfig_path).map_err(|e| {
            ExecutorError::ConfigurationError(format!(
                "failed to read kubeconfig {}: {}",
                kubeconfig_path.display(),
                e
            ))
        })?;

        let context = Self::resolve_context(&kubeconfig, context)?;
        let options = KubeConfigOptions {
            context: Some(context.clone()),
            ..Default::default()
        };

        let config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| {
                ExecutorError::ConfigurationError(format!(
                    "invalid kubeconfig context '{}': {}",
                    context, e
                ))
            })?;

        let client = Client::try_from(config).map_err(|e| {
            ExecutorError::ConfigurationError(format!("failed to create cluster client: {}", e))
        })?;

        info!(
            kubeconfig = %kubeconfig_path.display(),
            context = %context,
            "Created cluster client"
        );
        Ok(Arc::new(KubeClusterClient::new(client)))
    }

    /// Named context if given, the current context otherwise; either must
    /// exist in the file
    pub fn resolve_context(kubeconfig: &Kubeconfig, requested: &str) -> Result<String> {
        let name = if requested.trim().is_empty() {
            kubeconfig.current_context.clone().ok_or_else(|| {
                ExecutorError::ConfigurationError(
                    "kubeconfig has no current context and none was configured".to_string(),
                )
            })?
        } else {
            requested.trim().to_string()
        };

        if kubeconfig.contexts.iter().any(|c| c.name == name) {
            Ok(name)
        } else {
            Err(ExecutorError::ConfigurationError(format!(
                "context '{}' not found in kubeconfig",
                name
            )))
        }
    }
}

/// [`ClusterApi`] over a kube client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn jobs(&self, namespace: &str) -> Api<K8sJob> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterClient {
    async fn create_job(&self, namespace: &str, job: &K8sJob) -> Result<()> {
        self.jobs(namespace)
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| ExecutorError::SubmissionError(format!("failed to create job: {}", e)))?;
        Ok(())
    }

    async fn read_job_status(&self, namespace: &str, name: &str) -> Result<K8sJobStatus> {
        let job = self
            .jobs(namespace)
            .get_status(name)
            .await
            .map_err(|e| ExecutorError::PollingError(format!("failed to read job status: {}", e)))?;

        debug!(job = name, "Read job status");
        Ok(job.status.unwrap_or_default())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .jobs(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                warn!(job = name, "Job already deleted");
                Ok(())
            }
            Err(e) => Err(ExecutorError::SubmissionError(format!(
                "failed to delete job {}/{}: {}",
                namespace, name, e
            ))),
        }
    }
}

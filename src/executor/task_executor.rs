//! One task invocation, end to end
//!
//! `run` stores the payload, builds and publishes the task image, submits the
//! job, waits for it and returns the deserialized result. Every stage error
//! is returned unchanged; nothing is retried here.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::build::{BuildSpec, ImageBuilder};
use crate::config::ExecutorConfig;
use crate::connectors::docker::DockerCliEngine;
use crate::connectors::cloud::EcrCredentialProvider;
use crate::connectors::kubernetes::{ClusterClientFactory, JobPoller, JobSubmitter};
use crate::connectors::{ClusterApi, ContainerEngine, RegistryCredentialProvider};
use crate::core::log_task_error;
use crate::domain::entities::{
    HostPathMount, JobDescriptor, JobHandle, ResourceRequests, RunId, TaskInvocation,
};
use crate::error::{ExecutorError, Result};
use crate::executor::{JsonTaskSerializer, ResultFetcher, TaskSerializer};
use crate::registry::{RegistryRoute, RegistryRouter};
use crate::storage::{ArtifactLocation, ArtifactStore, ArtifactStoreFactory};

/// External collaborators of a [`TaskExecutor`]
pub struct ExecutorComponents {
    pub store: Arc<dyn ArtifactStore>,
    pub engine: Arc<dyn ContainerEngine>,
    pub credential_provider: Arc<dyn RegistryCredentialProvider>,
    pub cluster: Arc<dyn ClusterApi>,
    pub serializer: Arc<dyn TaskSerializer>,
}

pub struct TaskExecutor {
    config: ExecutorConfig,
    store: Arc<dyn ArtifactStore>,
    serializer: Arc<dyn TaskSerializer>,
    builder: ImageBuilder,
    router: RegistryRouter,
    submitter: JobSubmitter,
    poller: JobPoller,
    fetcher: ResultFetcher,
}

impl TaskExecutor {
    /// Wire an executor from explicit components. Fails only on invalid
    /// configuration.
    pub fn new(config: ExecutorConfig, components: ExecutorComponents) -> Result<Self> {
        config.validate()?;

        let location = config.artifact_location()?;
        if &location != components.store.location() {
            return Err(ExecutorError::ConfigurationError(format!(
                "artifact store is at {:?} but the configuration names {}",
                components.store.location(),
                config.artifact_store
            )));
        }

        let route = RegistryRoute::select(
            &config.registry,
            config.registry_credentials_file.as_ref(),
        );
        info!(
            route = route.name(),
            store = components.store.backend_name(),
            namespace = %config.namespace,
            "Task executor configured"
        );

        Ok(Self {
            builder: ImageBuilder::new(
                components.engine.clone(),
                &config.cache_dir,
                &config.image_repository,
            ),
            router: RegistryRouter::new(
                route,
                components.engine,
                components.credential_provider,
            ),
            submitter: JobSubmitter::new(components.cluster.clone()),
            poller: JobPoller::new(components.cluster, config.poll_interval())
                .with_deadline(config.poll_deadline()),
            fetcher: ResultFetcher::new(
                components.store.clone(),
                components.serializer.clone(),
                &config.cache_dir,
            ),
            store: components.store,
            serializer: components.serializer,
            config,
        })
    }

    /// Wire the production components: kube client from the configured
    /// kubeconfig, the configured artifact store, the docker CLI and ECR.
    ///
    /// Every configuration problem surfaces here, before any side effect.
    pub async fn from_config(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;

        let cluster =
            ClusterClientFactory::create(&config.kubeconfig_path, &config.kube_context).await?;
        let store = ArtifactStoreFactory::create_store(&config.artifact_store).await?;
        let engine = Arc::new(DockerCliEngine::new(config.local_image_load_command.clone()));

        Self::new(
            config,
            ExecutorComponents {
                store,
                engine,
                credential_provider: Arc::new(EcrCredentialProvider::new()),
                cluster,
                serializer: Arc::new(JsonTaskSerializer),
            },
        )
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn route(&self) -> &RegistryRoute {
        self.router.route()
    }

    /// Handle of the job `run` creates for `invocation`
    pub fn job_handle(&self, invocation: &TaskInvocation) -> JobHandle {
        JobHandle {
            name: invocation.run_id().job_name(),
            namespace: self.namespace_for(invocation),
        }
    }

    fn namespace_for(&self, invocation: &TaskInvocation) -> String {
        invocation
            .namespace
            .clone()
            .unwrap_or_else(|| self.config.namespace.clone())
    }

    fn resources_for(&self, invocation: &TaskInvocation) -> ResourceRequests {
        invocation.resources.clone().unwrap_or_else(|| ResourceRequests {
            cpu: self.config.cpu.clone(),
            memory: self.config.memory.clone(),
        })
    }

    /// Execute `invocation` on the cluster and return its result
    pub async fn run(&self, invocation: &TaskInvocation) -> Result<Value> {
        let run_id = invocation.run_id();
        info!(
            run_id = %run_id,
            dispatch_id = %invocation.dispatch_id,
            node_id = %invocation.node_id,
            "Starting task"
        );

        let payload = self.serializer.serialize_task(&invocation.payload);
        let payload = staged(&run_id, "serialize", payload)?;
        staged(
            &run_id,
            "store",
            self.store.put(&run_id.function_key(), payload).await,
        )?;

        let handle = match self.launch(invocation, &run_id).await {
            Ok(handle) => handle,
            Err(e) => {
                self.discard_payload(&run_id).await;
                return Err(e);
            }
        };
        staged(&run_id, "poll", self.poller.wait(&handle).await)?;
        let result = staged(&run_id, "fetch", self.fetcher.fetch(&run_id).await)?;

        info!(run_id = %run_id, job = %handle, "Task completed");
        Ok(result)
    }

    /// Build, publish and submit. Nothing has reached the cluster when this
    /// fails.
    async fn launch(&self, invocation: &TaskInvocation, run_id: &RunId) -> Result<JobHandle> {
        let base_image = invocation
            .base_image
            .clone()
            .unwrap_or_else(|| self.config.base_image.clone());
        let spec = BuildSpec::new(
            run_id.clone(),
            base_image,
            self.config.working_dir.clone(),
            self.store.location().clone(),
            self.config.worker_runtime.clone(),
            self.serializer.worker_codec(),
        );
        let image = staged(
            run_id,
            "build",
            self.builder.build(&spec, &run_id.image_tag()).await,
        )?;
        let reference = staged(run_id, "publish", self.router.publish(&image).await)?;

        let volume = match self.store.location() {
            ArtifactLocation::SharedPath(root) => {
                let path = root.display().to_string();
                Some(HostPathMount {
                    host_path: path.clone(),
                    mount_path: path,
                })
            }
            ArtifactLocation::Bucket { .. } => None,
        };
        let descriptor = JobDescriptor::new(run_id, self.namespace_for(invocation), reference)
            .with_resources(self.resources_for(invocation))
            .with_volume(volume)
            .with_label("dispatch-id", &invocation.dispatch_id)
            .with_label("node-id", &invocation.node_id);

        staged(run_id, "submit", self.submitter.submit(&descriptor).await)
    }

    async fn discard_payload(&self, run_id: &RunId) {
        let key = run_id.function_key();
        match self.store.delete(&key).await {
            Ok(()) => info!(run_id = %run_id, key = %key, "Discarded payload of unsubmitted task"),
            Err(e) => warn!(run_id = %run_id, key = %key, error = %e, "Failed to discard payload"),
        }
    }

    /// Delete the job created for a run. `run` never does this on its own.
    pub async fn cleanup(&self, handle: &JobHandle) -> Result<()> {
        self.submitter.delete(handle).await
    }
}

fn staged<T>(run_id: &RunId, stage: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        log_task_error(e, run_id.as_str(), stage);
    }
    result
}

//! Batch job manifest construction and submission

use k8s_openapi::api::batch::v1::{Job as K8sJob, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::connectors::ClusterApi;
use crate::domain::entities::{JobDescriptor, JobHandle};
use crate::error::Result;

/// Name of the host-path volume carrying shared-path artifacts
pub const ARTIFACT_VOLUME_NAME: &str = "artifact-store";

pub struct JobSubmitter {
    cluster: Arc<dyn ClusterApi>,
}

impl JobSubmitter {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Translate `descriptor` into a batch/v1 Job: one container, no restarts,
    /// no retries
    pub fn build_job(descriptor: &JobDescriptor) -> K8sJob {
        let mut requests = BTreeMap::new();
        if let Some(cpu) = &descriptor.resources.cpu {
            requests.insert("cpu".to_string(), Quantity(cpu.clone()));
        }
        if let Some(memory) = &descriptor.resources.memory {
            requests.insert("memory".to_string(), Quantity(memory.clone()));
        }

        let (volumes, volume_mounts) = match &descriptor.volume {
            Some(mount) => (
                Some(vec![Volume {
                    name: ARTIFACT_VOLUME_NAME.to_string(),
                    host_path: Some(HostPathVolumeSource {
                        path: mount.host_path.clone(),
                        type_: None,
                    }),
                    ..Default::default()
                }]),
                Some(vec![VolumeMount {
                    name: ARTIFACT_VOLUME_NAME.to_string(),
                    mount_path: mount.mount_path.clone(),
                    ..Default::default()
                }]),
            ),
            None => (None, None),
        };

        let container = Container {
            name: descriptor.container_name.clone(),
            image: Some(descriptor.image.to_string()),
            image_pull_policy: descriptor.pull_policy.as_k8s_value(),
            resources: if requests.is_empty() {
                None
            } else {
                Some(ResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                })
            },
            volume_mounts,
            ..Default::default()
        };

        let template = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(descriptor.labels.clone()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container],
                restart_policy: Some("Never".to_string()),
                volumes,
                ..Default::default()
            }),
        };

        K8sJob {
            metadata: ObjectMeta {
                name: Some(descriptor.name.clone()),
                namespace: Some(descriptor.namespace.clone()),
                labels: Some(descriptor.labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                template,
                backoff_limit: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub async fn submit(&self, descriptor: &JobDescriptor) -> Result<JobHandle> {
        let job = Self::build_job(descriptor);

        if let Err(e) = self.cluster.create_job(&descriptor.namespace, &job).await {
            error!(job = %descriptor.name, namespace = %descriptor.namespace, error = %e, "Job submission failed");
            return Err(e);
        }

        let handle = JobHandle {
            name: descriptor.name.clone(),
            namespace: descriptor.namespace.clone(),
        };
        info!(job = %handle, image = %descriptor.image, "Submitted job");
        Ok(handle)
    }

    /// Delete the job and, in the background, its pods
    pub async fn delete(&self, handle: &JobHandle) -> Result<()> {
        self.cluster.delete_job(&handle.namespace, &handle.name).await?;
        info!(job = %handle, "Deleted job");
        Ok(())
    }
}

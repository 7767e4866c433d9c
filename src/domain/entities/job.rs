//! Cluster batch-job entities

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::image::{ImagePullPolicy, ImageReference};
use super::task::{ResourceRequests, RunId};

/// Observed state of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    /// The status query itself failed; not a real job state
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Host directory shared between the submitter and the worker container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathMount {
    pub host_path: String,
    pub mount_path: String,
}

/// Everything needed to create the batch job for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub namespace: String,
    pub container_name: String,
    pub image: ImageReference,
    pub pull_policy: ImagePullPolicy,
    pub resources: ResourceRequests,
    pub volume: Option<HostPathMount>,
    pub labels: BTreeMap<String, String>,
}

impl JobDescriptor {
    pub fn new(run_id: &RunId, namespace: impl Into<String>, image: ImageReference) -> Self {
        let pull_policy = image.pull_policy();
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "kube-task-executor".to_string());
        labels.insert("run-id".to_string(), run_id.to_string());

        Self {
            name: run_id.job_name(),
            namespace: namespace.into(),
            container_name: run_id.container_name(),
            image,
            pull_policy,
            resources: ResourceRequests::default(),
            volume: None,
            labels,
        }
    }

    pub fn with_resources(mut self, resources: ResourceRequests) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_volume(mut self, volume: Option<HostPathMount>) -> Self {
        self.volume = volume;
        self
    }

    /// Add a label, coercing the value into label syntax
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), sanitize_label_value(value));
        self
    }
}

/// Handle on a job that was accepted by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Label values: at most 63 characters of `[A-Za-z0-9._-]`, starting and
/// ending with an alphanumeric character.
pub fn sanitize_label_value(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .take(63)
        .collect();

    replaced
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

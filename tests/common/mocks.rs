use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job as K8sJob, JobCondition, JobStatus as K8sJobStatus};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use kube_task_executor::connectors::{ClusterApi, ContainerEngine, RegistryCredentialProvider};
use kube_task_executor::error::{ExecutorError, Result};
use kube_task_executor::registry::{ManagedRegistryLogin, RegistryCredentials};
use kube_task_executor::storage::{
    ArtifactLocation, ArtifactStore, FilesystemArtifactStore,
};

/// One call made against the container engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Build { tag: String },
    Tag { source: String, target: String },
    Login { registry: String, username: String },
    Push { image: String },
    LocalLoad { image: String },
}

/// Container engine that records calls and snapshots every build context
#[derive(Default)]
pub struct RecordingEngine {
    calls: Arc<RwLock<Vec<EngineCall>>>,
    /// Build tag -> (file name, content) of everything in the context
    contexts: Arc<RwLock<HashMap<String, Vec<(String, String)>>>>,
    build_files: Arc<RwLock<HashMap<String, String>>>,
    should_fail_build: Arc<RwLock<bool>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_should_fail_build(&self, fail: bool) {
        *self.should_fail_build.write().await = fail;
    }

    pub async fn calls(&self) -> Vec<EngineCall> {
        self.calls.read().await.clone()
    }

    pub async fn count(&self, matches: fn(&EngineCall) -> bool) -> usize {
        self.calls.read().await.iter().filter(|c| matches(c)).count()
    }

    pub async fn context_of(&self, tag: &str) -> Vec<(String, String)> {
        self.contexts.read().await.get(tag).cloned().unwrap_or_default()
    }

    pub async fn build_file_of(&self, tag: &str) -> Option<String> {
        self.build_files.read().await.get(tag).cloned()
    }

    async fn record(&self, call: EngineCall) {
        self.calls.write().await.push(call);
    }
}

#[async_trait]
impl ContainerEngine for RecordingEngine {
    async fn build_image(&self, context_dir: &Path, build_file: &Path, tag: &str) -> Result<()> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(context_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let content = tokio::fs::read_to_string(entry.path()).await?;
            files.push((entry.file_name().to_string_lossy().to_string(), content));
        }
        files.sort();

        self.contexts.write().await.insert(tag.to_string(), files);
        self.build_files
            .write()
            .await
            .insert(tag.to_string(), tokio::fs::read_to_string(build_file).await?);
        self.record(EngineCall::Build {
            tag: tag.to_string(),
        })
        .await;

        if *self.should_fail_build.read().await {
            return Err(ExecutorError::ImageBuildError(
                "docker build exited with 1".to_string(),
            ));
        }
        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        self.record(EngineCall::Tag {
            source: source.to_string(),
            target: target.to_string(),
        })
        .await;
        Ok(())
    }

    async fn login(&self, registry: &str, credentials: &RegistryCredentials) -> Result<()> {
        self.record(EngineCall::Login {
            registry: registry.to_string(),
            username: credentials.username.clone(),
        })
        .await;
        Ok(())
    }

    async fn push_image(&self, image: &str) -> Result<()> {
        self.record(EngineCall::Push {
            image: image.to_string(),
        })
        .await;
        Ok(())
    }

    async fn load_into_local_cluster(&self, image: &str) -> Result<()> {
        self.record(EngineCall::LocalLoad {
            image: image.to_string(),
        })
        .await;
        Ok(())
    }
}

/// Managed registry provider returning fixed credentials
pub struct StaticCredentialProvider {
    endpoint: String,
    call_count: Arc<RwLock<usize>>,
    credentials_files: Arc<RwLock<Vec<Option<PathBuf>>>>,
}

impl StaticCredentialProvider {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            call_count: Arc::new(RwLock::new(0)),
            credentials_files: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn call_count(&self) -> usize {
        *self.call_count.read().await
    }

    /// Credentials file passed with each login
    pub async fn credentials_files(&self) -> Vec<Option<PathBuf>> {
        self.credentials_files.read().await.clone()
    }
}

#[async_trait]
impl RegistryCredentialProvider for StaticCredentialProvider {
    async fn managed_login(
        &self,
        _registry: &str,
        credentials_file: Option<&Path>,
    ) -> Result<ManagedRegistryLogin> {
        *self.call_count.write().await += 1;
        self.credentials_files
            .write()
            .await
            .push(credentials_file.map(Path::to_path_buf));
        Ok(ManagedRegistryLogin {
            endpoint: self.endpoint.clone(),
            credentials: RegistryCredentials::new("AWS", "token"),
        })
    }
}

/// Artifact store that records every operation before delegating to disk
pub struct RecordingStore {
    inner: FilesystemArtifactStore,
    operations: Arc<RwLock<Vec<(String, String)>>>,
}

impl RecordingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: FilesystemArtifactStore::new(root),
            operations: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn operations(&self) -> Vec<(String, String)> {
        self.operations.read().await.clone()
    }

    pub async fn gets(&self) -> usize {
        self.operations
            .read()
            .await
            .iter()
            .filter(|(op, _)| op == "get")
            .count()
    }

    async fn record(&self, op: &str, key: &str) {
        self.operations
            .write()
            .await
            .push((op.to_string(), key.to_string()));
    }
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.record("put", key).await;
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.record("get", key).await;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.record("delete", key).await;
        self.inner.delete(key).await
    }

    fn location(&self) -> &ArtifactLocation {
        self.inner.location()
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

pub type TaskFn = Arc<dyn Fn(&[Value], &Map<String, Value>) -> Value + Send + Sync>;

/// Stands in for the worker container. Follows the generated entrypoint:
/// decodes the JSON payload document, turns the `function` bytes back into
/// a callable (here a lookup of registered closures), calls it with the
/// stored args and kwargs and writes the JSON-encoded result.
pub struct SimulatedWorker {
    store: Arc<dyn ArtifactStore>,
    functions: HashMap<Vec<u8>, TaskFn>,
}

impl SimulatedWorker {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            functions: HashMap::new(),
        }
    }

    pub fn with_function(mut self, serialized: &[u8], task: TaskFn) -> Self {
        self.functions.insert(serialized.to_vec(), task);
        self
    }

    pub async fn execute(&self, run_id: &str) -> Result<()> {
        let bytes = self.store.get(&format!("func-{}.pkl", run_id)).await?;
        let document: Value = serde_json::from_slice(&bytes)?;

        let serialized: Vec<u8> = serde_json::from_value(document["function"].clone())?;
        let function = self.functions.get(&serialized).ok_or_else(|| {
            ExecutorError::DeserializationError("worker cannot load function".to_string())
        })?;
        let args = document["args"].as_array().cloned().unwrap_or_default();
        let kwargs = document["kwargs"].as_object().cloned().unwrap_or_default();

        let result = function(&args, &kwargs);
        self.store
            .put(&format!("result-{}.pkl", run_id), serde_json::to_vec(&result)?)
            .await
    }
}

/// One scripted answer to a status query
#[derive(Debug, Clone)]
pub enum StatusStep {
    Running,
    Succeeded,
    Failed,
    QueryError,
}

impl StatusStep {
    fn into_status(self) -> Result<K8sJobStatus> {
        let condition = |kind: &str| {
            Some(vec![JobCondition {
                type_: kind.to_string(),
                status: "True".to_string(),
                ..Default::default()
            }])
        };

        match self {
            StatusStep::Running => Ok(K8sJobStatus {
                active: Some(1),
                ..Default::default()
            }),
            StatusStep::Succeeded => Ok(K8sJobStatus {
                succeeded: Some(1),
                conditions: condition("Complete"),
                ..Default::default()
            }),
            StatusStep::Failed => Ok(K8sJobStatus {
                failed: Some(1),
                conditions: condition("Failed"),
                ..Default::default()
            }),
            StatusStep::QueryError => Err(ExecutorError::PollingError(
                "the server is currently unable to handle the request".to_string(),
            )),
        }
    }
}

/// Cluster that accepts jobs, optionally runs them through a simulated
/// worker and answers status queries from a script. The last scripted step
/// repeats.
pub struct ScriptedCluster {
    script: Arc<RwLock<VecDeque<StatusStep>>>,
    created: Arc<RwLock<Vec<(String, K8sJob)>>>,
    deleted: Arc<RwLock<Vec<String>>>,
    status_queries: Arc<RwLock<usize>>,
    worker: Option<SimulatedWorker>,
    reject_jobs: bool,
}

impl ScriptedCluster {
    pub fn new(script: Vec<StatusStep>) -> Self {
        Self {
            script: Arc::new(RwLock::new(script.into())),
            created: Arc::new(RwLock::new(Vec::new())),
            deleted: Arc::new(RwLock::new(Vec::new())),
            status_queries: Arc::new(RwLock::new(0)),
            worker: None,
            reject_jobs: false,
        }
    }

    pub fn with_worker(mut self, worker: SimulatedWorker) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn rejecting_jobs(mut self) -> Self {
        self.reject_jobs = true;
        self
    }

    pub async fn created_jobs(&self) -> Vec<(String, K8sJob)> {
        self.created.read().await.clone()
    }

    pub async fn deleted_jobs(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    pub async fn status_queries(&self) -> usize {
        *self.status_queries.read().await
    }
}

#[async_trait]
impl ClusterApi for ScriptedCluster {
    async fn create_job(&self, namespace: &str, job: &K8sJob) -> Result<()> {
        if self.reject_jobs {
            return Err(ExecutorError::SubmissionError(
                "admission webhook denied the request".to_string(),
            ));
        }

        self.created
            .write()
            .await
            .push((namespace.to_string(), job.clone()));

        if let Some(worker) = &self.worker {
            let name = job.metadata.name.clone().unwrap_or_default();
            let run_id = name.strip_prefix("job-").unwrap_or(&name);
            worker.execute(run_id).await?;
        }
        Ok(())
    }

    async fn read_job_status(&self, _namespace: &str, _name: &str) -> Result<K8sJobStatus> {
        *self.status_queries.write().await += 1;

        let mut script = self.script.write().await;
        let step = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        step.unwrap_or(StatusStep::Running).into_status()
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        self.deleted
            .write()
            .await
            .push(format!("{}/{}", namespace, name));
        Ok(())
    }
}

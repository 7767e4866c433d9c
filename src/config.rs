//! Executor configuration
//!
//! Defaults come first, then an optional YAML or JSON file named by
//! `KUBE_TASK_CONFIG_FILE`, then `KUBE_TASK_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ExecutorError, Result};
use crate::storage::ArtifactLocation;

const ENV_PREFIX: &str = "KUBE_TASK_";

/// Runtime installed into the worker image to execute the entrypoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerRuntime {
    /// Interpreter that runs the entrypoint script
    pub interpreter: String,
    /// Package providing the payload serializer
    pub serializer_package: String,
    /// Package providing the object-storage client, installed for bucket stores only
    pub object_store_package: String,
}

impl Default for WorkerRuntime {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            serializer_package: "cloudpickle==2.0.0".to_string(),
            object_store_package: "boto3==1.20.48".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub base_image: String,
    pub kubeconfig_path: PathBuf,
    /// Context inside the kubeconfig; empty selects the current context
    pub kube_context: String,
    pub namespace: String,
    /// Registry host, `localhost[:port]` for a local cluster, or empty
    pub registry: String,
    pub registry_credentials_file: Option<PathBuf>,
    pub image_repository: String,
    /// `s3://bucket[/prefix]` or an absolute shared directory
    pub artifact_store: String,
    pub cache_dir: PathBuf,
    /// Working directory inside the worker container
    pub working_dir: String,
    pub poll_interval_seconds: u64,
    /// Upper bound on polling; `None` polls until a terminal state
    pub poll_deadline_seconds: Option<u64>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub worker_runtime: WorkerRuntime,
    /// Command that loads a local image into a single-node cluster; the
    /// image reference is appended as the last argument
    pub local_image_load_command: Vec<String>,
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            base_image: "python:3.8-slim-bullseye".to_string(),
            kubeconfig_path: home.join(".kube/config"),
            kube_context: String::new(),
            namespace: "default".to_string(),
            registry: String::new(),
            registry_credentials_file: None,
            image_repository: "kube-task".to_string(),
            artifact_store: "/tmp/kube-task-artifacts".to_string(),
            cache_dir: home.join(".cache/kube-task-executor"),
            working_dir: "/opt/kube-task".to_string(),
            poll_interval_seconds: 10,
            poll_deadline_seconds: None,
            cpu: None,
            memory: None,
            worker_runtime: WorkerRuntime::default(),
            local_image_load_command: vec![
                "minikube".to_string(),
                "image".to_string(),
                "load".to_string(),
            ],
        }
    }
}

impl ExecutorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn poll_deadline(&self) -> Option<Duration> {
        self.poll_deadline_seconds.map(Duration::from_secs)
    }

    pub fn artifact_location(&self) -> Result<ArtifactLocation> {
        ArtifactLocation::parse(&self.artifact_store)
    }

    /// Check everything that can be checked without touching a remote system
    pub fn validate(&self) -> Result<()> {
        self.artifact_location()?;

        if self.base_image.trim().is_empty() {
            return Err(ExecutorError::ConfigurationError(
                "base image is required".to_string(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(ExecutorError::ConfigurationError(
                "namespace is required".to_string(),
            ));
        }
        if self.image_repository.trim().is_empty() || self.image_repository.contains(':') {
            return Err(ExecutorError::ConfigurationError(format!(
                "invalid image repository '{}'",
                self.image_repository
            )));
        }
        if !self.working_dir.starts_with('/') {
            return Err(ExecutorError::ConfigurationError(format!(
                "working directory '{}' must be absolute",
                self.working_dir
            )));
        }
        if self.local_image_load_command.is_empty() {
            return Err(ExecutorError::ConfigurationError(
                "local image load command is empty".to_string(),
            ));
        }
        if self.worker_runtime.interpreter.trim().is_empty() {
            return Err(ExecutorError::ConfigurationError(
                "worker interpreter is required".to_string(),
            ));
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

/// Loads [`ExecutorConfig`] from file and environment
#[derive(Debug, Default)]
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` instead of `KUBE_TASK_CONFIG_FILE`
    pub fn with_config_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load from `.env`, the config file and the process environment
    pub async fn load(&self) -> Result<ExecutorConfig> {
        dotenv::dotenv().ok();

        let mut config = ExecutorConfig::default();

        let path = self
            .config_path
            .clone()
            .or_else(|| std::env::var(format!("{}CONFIG_FILE", ENV_PREFIX)).ok().map(PathBuf::from));
        if let Some(path) = path {
            config = Self::load_from_file(&path).await?;
        }

        Self::apply_env(&mut config, |name| std::env::var(name).ok())?;
        config.validate()?;

        info!(
            namespace = %config.namespace,
            artifact_store = %config.artifact_store,
            registry = %config.registry,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse a YAML (`.yaml`/`.yml`) or JSON (`.json`) config file
    pub async fn load_from_file(path: &Path) -> Result<ExecutorConfig> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ExecutorError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                ExecutorError::ConfigurationError(format!("Invalid JSON config: {}", e))
            })?,
            _ => {
                return Err(ExecutorError::ConfigurationError(
                    "Config file must be .yaml, .yml, or .json".to_string(),
                ))
            }
        };

        debug!(path = %path.display(), "Configuration loaded from file");
        Ok(config)
    }

    /// Override fields from `KUBE_TASK_*` variables returned by `lookup`
    pub fn apply_env<F>(config: &mut ExecutorConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(value) = var("BASE_IMAGE") {
            config.base_image = value;
        }
        if let Some(value) = var("KUBECONFIG").or_else(|| lookup("KUBECONFIG")) {
            config.kubeconfig_path = PathBuf::from(value);
        }
        if let Some(value) = var("CONTEXT") {
            config.kube_context = value;
        }
        if let Some(value) = var("NAMESPACE") {
            config.namespace = value;
        }
        if let Some(value) = var("REGISTRY") {
            config.registry = value;
        }
        if let Some(value) = var("REGISTRY_CREDENTIALS_FILE") {
            config.registry_credentials_file = if value.is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        if let Some(value) = var("IMAGE_REPOSITORY") {
            config.image_repository = value;
        }
        if let Some(value) = var("ARTIFACT_STORE") {
            config.artifact_store = value;
        }
        if let Some(value) = var("CACHE_DIR") {
            config.cache_dir = PathBuf::from(value);
        }
        if let Some(value) = var("WORKING_DIR") {
            config.working_dir = value;
        }
        if let Some(value) = var("POLL_INTERVAL_SECONDS") {
            config.poll_interval_seconds = value.parse().map_err(|e| {
                ExecutorError::ConfigurationError(format!("Invalid POLL_INTERVAL_SECONDS: {}", e))
            })?;
        }
        if let Some(value) = var("POLL_DEADLINE_SECONDS") {
            config.poll_deadline_seconds = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.parse().map_err(|e| {
                    ExecutorError::ConfigurationError(format!(
                        "Invalid POLL_DEADLINE_SECONDS: {}",
                        e
                    ))
                })?)
            };
        }
        if let Some(value) = var("CPU") {
            config.cpu = Some(value);
        }
        if let Some(value) = var("MEMORY") {
            config.memory = Some(value);
        }
        if let Some(value) = var("LOCAL_IMAGE_LOAD_COMMAND") {
            config.local_image_load_command =
                value.split_whitespace().map(str::to_string).collect();
        }

        Ok(())
    }
}

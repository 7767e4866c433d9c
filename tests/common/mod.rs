//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;
use tempfile::TempDir;

use kube_task_executor::config::ExecutorConfig;
use kube_task_executor::executor::{ExecutorComponents, JsonTaskSerializer, TaskExecutor};

use mocks::{RecordingEngine, RecordingStore, ScriptedCluster, StaticCredentialProvider};

pub const MANAGED_REGISTRY: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com";

/// Temporary directories plus the doubles behind one executor
pub struct TestHarness {
    pub store_dir: TempDir,
    pub cache_dir: TempDir,
    pub store: Arc<RecordingStore>,
    pub engine: Arc<RecordingEngine>,
    pub provider: Arc<StaticCredentialProvider>,
    pub cluster: Arc<ScriptedCluster>,
    pub executor: TaskExecutor,
}

/// Configuration pointing at temporary directories, polling without delay
pub fn test_config(store_dir: &TempDir, cache_dir: &TempDir, registry: &str) -> ExecutorConfig {
    ExecutorConfig {
        registry: registry.to_string(),
        artifact_store: store_dir.path().display().to_string(),
        cache_dir: cache_dir.path().to_path_buf(),
        poll_interval_seconds: 0,
        ..Default::default()
    }
}

pub struct HarnessBuilder {
    config: ExecutorConfig,
    store_dir: TempDir,
    cache_dir: TempDir,
}

impl HarnessBuilder {
    pub fn new(registry: &str) -> Self {
        let store_dir = tempfile::tempdir().expect("store dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        Self {
            config: test_config(&store_dir, &cache_dir, registry),
            store_dir,
            cache_dir,
        }
    }

    pub fn configure(mut self, change: impl FnOnce(&mut ExecutorConfig)) -> Self {
        change(&mut self.config);
        self
    }

    pub fn store(&self) -> Arc<RecordingStore> {
        Arc::new(RecordingStore::new(self.store_dir.path()))
    }

    /// Build the harness around `cluster`, created from the harness store
    pub fn build(
        self,
        make_cluster: impl FnOnce(Arc<RecordingStore>) -> ScriptedCluster,
    ) -> TestHarness {
        let store = self.store();
        let engine = Arc::new(RecordingEngine::new());
        let provider = Arc::new(StaticCredentialProvider::new(MANAGED_REGISTRY));
        let cluster = Arc::new(make_cluster(store.clone()));

        let executor = TaskExecutor::new(
            self.config,
            ExecutorComponents {
                store: store.clone(),
                engine: engine.clone(),
                credential_provider: provider.clone(),
                cluster: cluster.clone(),
                serializer: Arc::new(JsonTaskSerializer),
            },
        )
        .expect("valid test configuration");

        TestHarness {
            store_dir: self.store_dir,
            cache_dir: self.cache_dir,
            store,
            engine,
            provider,
            cluster,
            executor,
        }
    }
}

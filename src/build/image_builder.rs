//! Per-run image builds
//!
//! Every run gets its own context directory and build file under the cache
//! directory, so concurrent builds never share a file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::build::template_engine::{BuildSpec, TemplateEngine};
use crate::connectors::ContainerEngine;
use crate::domain::entities::ImageHandle;
use crate::error::{ExecutorError, Result};

pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
    cache_dir: PathBuf,
    repository: String,
}

impl ImageBuilder {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        cache_dir: impl Into<PathBuf>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            cache_dir: cache_dir.into(),
            repository: repository.into(),
        }
    }

    pub fn context_dir(&self, spec: &BuildSpec) -> PathBuf {
        self.cache_dir.join(format!("context-{}", spec.run_id))
    }

    pub fn build_file_path(&self, spec: &BuildSpec) -> PathBuf {
        self.cache_dir.join(spec.run_id.build_filename())
    }

    /// Render, materialize and build the image for `spec`, tagged `tag`.
    ///
    /// The context directory and build file are removed afterwards whether
    /// or not the build succeeded.
    pub async fn build(&self, spec: &BuildSpec, tag: &str) -> Result<ImageHandle> {
        let image = ImageHandle::new(&self.repository, tag);
        let rendered = TemplateEngine::render(spec);
        let context_dir = self.context_dir(spec);
        let build_file = self.build_file_path(spec);

        info!(run_id = %spec.run_id, image = %image.local_name(), "Building task image");

        let result = async {
            tokio::fs::create_dir_all(&context_dir)
                .await
                .map_err(|e| build_io_error("create build context", &context_dir, e))?;

            let entrypoint_path = context_dir.join(&rendered.entrypoint_filename);
            tokio::fs::write(&entrypoint_path, &rendered.entrypoint)
                .await
                .map_err(|e| build_io_error("write entrypoint", &entrypoint_path, e))?;
            tokio::fs::write(&build_file, &rendered.build_file)
                .await
                .map_err(|e| build_io_error("write build file", &build_file, e))?;

            self.engine
                .build_image(&context_dir, &build_file, &image.local_name())
                .await
        }
        .await;

        self.remove_build_files(&context_dir, &build_file).await;

        result?;
        info!(run_id = %spec.run_id, image = %image.local_name(), "Task image built");
        Ok(image)
    }

    async fn remove_build_files(&self, context_dir: &Path, build_file: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(context_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %context_dir.display(), error = %e, "Failed to remove build context");
            }
        }
        if let Err(e) = tokio::fs::remove_file(build_file).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %build_file.display(), error = %e, "Failed to remove build file");
            }
        }
        debug!(context = %context_dir.display(), "Build files removed");
    }
}

fn build_io_error(action: &str, path: &Path, err: std::io::Error) -> ExecutorError {
    ExecutorError::ImageBuildError(format!("failed to {} {}: {}", action, path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerRuntime;
    use crate::domain::entities::RunId;
    use crate::executor::{JsonTaskSerializer, TaskSerializer};
    use crate::registry::RegistryCredentials;
    use crate::storage::ArtifactLocation;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Captures what the engine saw at build time
    #[derive(Default)]
    struct CapturingEngine {
        fail: bool,
        context_files: Mutex<Vec<String>>,
        build_file: Mutex<String>,
        tags: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContainerEngine for CapturingEngine {
        async fn build_image(&self, context_dir: &Path, build_file: &Path, tag: &str) -> Result<()> {
            let mut files: Vec<String> = std::fs::read_dir(context_dir)
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            files.sort();
            *self.context_files.lock().unwrap() = files;
            *self.build_file.lock().unwrap() = std::fs::read_to_string(build_file).unwrap();
            self.tags.lock().unwrap().push(tag.to_string());

            if self.fail {
                Err(ExecutorError::ImageBuildError("exit status 1".to_string()))
            } else {
                Ok(())
            }
        }

        async fn tag_image(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        async fn login(&self, _: &str, _: &RegistryCredentials) -> Result<()> {
            Ok(())
        }

        async fn push_image(&self, _: &str) -> Result<()> {
            Ok(())
        }

        async fn load_into_local_cluster(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn spec(node: &str) -> BuildSpec {
        BuildSpec::new(
            RunId::derive("dispatch", node),
            "python:3.8-slim-bullseye",
            "/opt/kube-task",
            ArtifactLocation::parse("/tmp/artifacts").unwrap(),
            WorkerRuntime::default(),
            JsonTaskSerializer.worker_codec(),
        )
    }

    #[tokio::test]
    async fn test_context_holds_only_the_entrypoint() {
        let cache = tempfile::tempdir().unwrap();
        let engine = Arc::new(CapturingEngine::default());
        let builder = ImageBuilder::new(engine.clone(), cache.path(), "kube-task");
        let spec = spec("0");

        let image = builder.build(&spec, &spec.run_id.image_tag()).await.unwrap();

        assert_eq!(image.local_name(), format!("kube-task:{}", spec.run_id));
        assert_eq!(*engine.context_files.lock().unwrap(), vec![spec.entrypoint_filename()]);
        assert!(engine
            .build_file
            .lock()
            .unwrap()
            .starts_with("FROM python:3.8-slim-bullseye"));
    }

    #[tokio::test]
    async fn test_build_files_removed_after_success() {
        let cache = tempfile::tempdir().unwrap();
        let builder = ImageBuilder::new(Arc::new(CapturingEngine::default()), cache.path(), "kube-task");
        let spec = spec("0");

        builder.build(&spec, "tag").await.unwrap();

        assert!(!builder.context_dir(&spec).exists());
        assert!(!builder.build_file_path(&spec).exists());
    }

    #[tokio::test]
    async fn test_build_failure_still_cleans_up() {
        let cache = tempfile::tempdir().unwrap();
        let engine = Arc::new(CapturingEngine {
            fail: true,
            ..Default::default()
        });
        let builder = ImageBuilder::new(engine, cache.path(), "kube-task");
        let spec = spec("0");

        assert!(matches!(
            builder.build(&spec, "tag").await,
            Err(ExecutorError::ImageBuildError(_))
        ));
        assert!(!builder.context_dir(&spec).exists());
        assert!(!builder.build_file_path(&spec).exists());
    }

    #[tokio::test]
    async fn test_distinct_runs_use_distinct_paths() {
        let cache = tempfile::tempdir().unwrap();
        let builder = ImageBuilder::new(Arc::new(CapturingEngine::default()), cache.path(), "kube-task");
        let (a, b) = (spec("0"), spec("1"));

        assert_ne!(builder.context_dir(&a), builder.context_dir(&b));
        assert_ne!(builder.build_file_path(&a), builder.build_file_path(&b));
    }
}

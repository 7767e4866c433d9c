//! Docker CLI container engine
//!
//! Builds, tags, logs in and pushes through the `docker` binary, and loads
//! images into a local single-node cluster through a configurable command
//! such as `minikube image load`.

use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::connectors::ContainerEngine;
use crate::error::{ExecutorError, Result};
use crate::registry::RegistryCredentials;

pub struct DockerCliEngine {
    docker_binary: String,
    local_load_command: Vec<String>,
}

impl DockerCliEngine {
    pub fn new(local_load_command: Vec<String>) -> Self {
        Self {
            docker_binary: "docker".to_string(),
            local_load_command,
        }
    }

    pub fn with_docker_binary(mut self, binary: impl Into<String>) -> Self {
        self.docker_binary = binary.into();
        self
    }

    async fn docker(&self, args: &[&str]) -> std::io::Result<Output> {
        debug!(binary = %self.docker_binary, ?args, "Running docker command");
        Command::new(&self.docker_binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

/// Turn a finished process into `Ok` or the error built by `fail`
fn check_output(output: Output, what: &str, fail: fn(String) -> ExecutorError) -> Result<()> {
    if output.status.success() {
        debug!(
            "{} succeeded: {}",
            what,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    error!(exit_code = %code, "{} failed: {}", what, stderr.trim());
    Err(fail(format!("{} exited with {}: {}", what, code, stderr.trim())))
}

#[async_trait]
impl ContainerEngine for DockerCliEngine {
    async fn build_image(&self, context_dir: &Path, build_file: &Path, tag: &str) -> Result<()> {
        info!(tag = tag, context = %context_dir.display(), "Building image");

        let build_file = build_file.to_string_lossy();
        let context = context_dir.to_string_lossy();
        let output = self
            .docker(&["build", "-f", &*build_file, "-t", tag, &*context])
            .await
            .map_err(|e| {
                ExecutorError::ImageBuildError(format!("failed to execute docker build: {}", e))
            })?;

        check_output(output, "docker build", ExecutorError::ImageBuildError)
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        let output = self
            .docker(&["tag", source, target])
            .await
            .map_err(|e| ExecutorError::PublishError(format!("failed to execute docker tag: {}", e)))?;

        check_output(output, "docker tag", ExecutorError::PublishError)
    }

    async fn login(&self, registry: &str, credentials: &RegistryCredentials) -> Result<()> {
        info!(registry = registry, username = %credentials.username, "Logging in to registry");

        let mut child = Command::new(&self.docker_binary)
            .args([
                "login",
                "--username",
                credentials.username.as_str(),
                "--password-stdin",
                registry,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ExecutorError::PublishError(format!("failed to spawn docker login: {}", e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(credentials.password.as_bytes())
                .await
                .map_err(|e| {
                    ExecutorError::PublishError(format!("failed to pass registry password: {}", e))
                })?;
            stdin.shutdown().await.map_err(|e| {
                ExecutorError::PublishError(format!("failed to close docker login stdin: {}", e))
            })?;
        }

        let output = child.wait_with_output().await.map_err(|e| {
            ExecutorError::PublishError(format!("failed to wait for docker login: {}", e))
        })?;

        check_output(output, "docker login", ExecutorError::PublishError)
    }

    async fn push_image(&self, image: &str) -> Result<()> {
        info!(image = image, "Pushing image");

        let output = self
            .docker(&["push", image])
            .await
            .map_err(|e| ExecutorError::PublishError(format!("failed to execute docker push: {}", e)))?;

        check_output(output, "docker push", ExecutorError::PublishError)
    }

    async fn load_into_local_cluster(&self, image: &str) -> Result<()> {
        let (program, args) = self.local_load_command.split_first().ok_or_else(|| {
            ExecutorError::ConfigurationError("local image load command is empty".to_string())
        })?;

        info!(image = image, loader = %program, "Loading image into local cluster");

        let output = Command::new(program)
            .args(args)
            .arg(image)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ExecutorError::PublishError(format!("failed to execute {}: {}", program, e))
            })?;

        // Some loaders only report problems on stderr; the exit status is
        // the contract.
        check_output(output, "local image load", ExecutorError::PublishError)
    }
}

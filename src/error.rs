use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact storage error: {0}")]
    StorageError(String),

    #[error("Image build failed: {0}")]
    ImageBuildError(String),

    #[error("Image publish failed: {0}")]
    PublishError(String),

    #[error("Job submission rejected: {0}")]
    SubmissionError(String),

    #[error("Job status polling failed: {0}")]
    PollingError(String),

    #[error("Job {job} still running after {waited:?}")]
    PollDeadlineExceeded { job: String, waited: Duration },

    #[error("Task failed in job {job}; last status: {status}")]
    TaskFailed { job: String, status: String },

    #[error("Job reported success but no result was found: {0}")]
    ResultUnavailable(String),

    #[error("Result deserialization failed: {0}")]
    DeserializationError(String),

    #[error("Task serialization failed: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl ExecutorError {
    /// Stable, lowercase name for the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::ConfigurationError(_) => "configuration",
            ExecutorError::ArtifactNotFound(_) => "artifact_not_found",
            ExecutorError::StorageError(_) => "storage",
            ExecutorError::ImageBuildError(_) => "image_build",
            ExecutorError::PublishError(_) => "publish",
            ExecutorError::SubmissionError(_) => "submission",
            ExecutorError::PollingError(_) => "polling",
            ExecutorError::PollDeadlineExceeded { .. } => "poll_deadline_exceeded",
            ExecutorError::TaskFailed { .. } => "task_failed",
            ExecutorError::ResultUnavailable(_) => "result_unavailable",
            ExecutorError::DeserializationError(_) => "deserialization",
            ExecutorError::SerializationError(_) => "serialization",
            ExecutorError::IoError(_) => "io",
        }
    }

    /// True when the failure happened before anything was created remotely.
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            ExecutorError::ConfigurationError(_)
                | ExecutorError::SerializationError(_)
                | ExecutorError::ImageBuildError(_)
                | ExecutorError::PublishError(_)
                | ExecutorError::SubmissionError(_)
        )
    }
}

impl From<std::io::Error> for ExecutorError {
    fn from(err: std::io::Error) -> Self {
        ExecutorError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ExecutorError {
    fn from(err: serde_json::Error) -> Self {
        ExecutorError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ExecutorError {
    fn from(err: serde_yaml::Error) -> Self {
        ExecutorError::ConfigurationError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for ExecutorError {
    fn from(err: toml::de::Error) -> Self {
        ExecutorError::ConfigurationError(format!("TOML error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

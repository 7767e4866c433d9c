//! Job status polling

use k8s_openapi::api::batch::v1::JobStatus as K8sJobStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::connectors::ClusterApi;
use crate::domain::entities::{JobHandle, JobStatus};
use crate::error::{ExecutorError, Result};

/// Consecutive failed status queries that end polling
const MAX_CONSECUTIVE_QUERY_FAILURES: u32 = 2;

/// Collapse a batch/v1 status into the four-state model.
///
/// Terminal conditions win over counters; a job with neither is running.
pub fn map_status(status: &K8sJobStatus) -> JobStatus {
    let condition_true = |kind: &str| {
        status
            .conditions
            .as_ref()
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == kind && c.status == "True")
            })
            .unwrap_or(false)
    };

    if condition_true("Complete") {
        JobStatus::Succeeded
    } else if condition_true("Failed") {
        JobStatus::Failed
    } else if status.succeeded.unwrap_or(0) > 0 {
        JobStatus::Succeeded
    } else if status.failed.unwrap_or(0) > 0 {
        JobStatus::Failed
    } else {
        JobStatus::Running
    }
}

pub struct JobPoller {
    cluster: Arc<dyn ClusterApi>,
    interval: Duration,
    deadline: Option<Duration>,
}

impl JobPoller {
    pub fn new(cluster: Arc<dyn ClusterApi>, interval: Duration) -> Self {
        Self {
            cluster,
            interval,
            deadline: None,
        }
    }

    /// Give up with `PollDeadlineExceeded` once `deadline` has elapsed
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// One status query; a failed query is reported as `Unknown`
    pub async fn current_status(&self, handle: &JobHandle) -> JobStatus {
        match self.query(handle).await {
            Ok((status, _)) => status,
            Err(_) => JobStatus::Unknown,
        }
    }

    async fn query(&self, handle: &JobHandle) -> Result<(JobStatus, K8sJobStatus)> {
        let raw = self
            .cluster
            .read_job_status(&handle.namespace, &handle.name)
            .await?;
        Ok((map_status(&raw), raw))
    }

    /// Poll until the job succeeds.
    ///
    /// A failed job is `TaskFailed` with the last status as JSON. The job is
    /// never deleted here, not even on deadline expiry.
    pub async fn wait(&self, handle: &JobHandle) -> Result<JobStatus> {
        let started = Instant::now();
        let mut consecutive_failures = 0u32;

        loop {
            match self.query(handle).await {
                Ok((JobStatus::Succeeded, _)) => {
                    info!(job = %handle, elapsed = ?started.elapsed(), "Job succeeded");
                    return Ok(JobStatus::Succeeded);
                }
                Ok((JobStatus::Failed, raw)) => {
                    let status = serde_json::to_string(&raw)
                        .unwrap_or_else(|e| format!("<unserializable status: {}>", e));
                    error!(job = %handle, status = %status, "Job failed");
                    return Err(ExecutorError::TaskFailed {
                        job: handle.to_string(),
                        status,
                    });
                }
                Ok((status, _)) => {
                    consecutive_failures = 0;
                    debug!(job = %handle, status = %status, "Job not finished");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_QUERY_FAILURES {
                        error!(job = %handle, error = %e, "Job status unavailable, giving up");
                        return Err(ExecutorError::PollingError(format!(
                            "status of {} unavailable after {} consecutive attempts: {}",
                            handle, consecutive_failures, e
                        )));
                    }
                    warn!(job = %handle, error = %e, "Job status query failed, retrying");
                }
            }

            if let Some(deadline) = self.deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    warn!(job = %handle, ?waited, "Poll deadline exceeded; job left running");
                    return Err(ExecutorError::PollDeadlineExceeded {
                        job: handle.to_string(),
                        waited,
                    });
                }
            }

            sleep(self.interval).await;
        }
    }
}

//! Domain entities for task execution

pub mod image;
pub mod job;
pub mod task;

pub use image::{ImageHandle, ImagePullPolicy, ImageReference};
pub use job::{HostPathMount, JobDescriptor, JobHandle, JobStatus};
pub use task::{ResourceRequests, RunId, TaskInvocation, TaskPayload};

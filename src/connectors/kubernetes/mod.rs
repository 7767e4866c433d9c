//! Kubernetes batch job integration

pub mod client;
pub mod poller;
pub mod submitter;

pub use client::{ClusterClientFactory, KubeClusterClient};
pub use poller::JobPoller;
pub use submitter::JobSubmitter;

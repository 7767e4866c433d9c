//! kube-task-executor - run serialized functions as Kubernetes batch jobs
//!
//! A task is packaged into a container image, published to wherever the
//! cluster can pull it from, executed as a one-shot job and its result read
//! back from a shared artifact store. [`executor::TaskExecutor::run`] drives
//! one invocation through those stages.

pub mod build;
pub mod config;
pub mod connectors;
pub mod core;
pub mod domain;
pub mod error;
pub mod executor;
pub mod registry;
pub mod storage;

pub use error::{ExecutorError, Result};
pub use executor::TaskExecutor;

//! Adapters for the container engine, registries and the cluster

pub mod cloud;
pub mod docker;
pub mod kubernetes;
pub mod traits;

pub use traits::{ClusterApi, ContainerEngine, RegistryCredentialProvider};

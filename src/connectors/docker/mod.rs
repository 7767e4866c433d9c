//! Docker-based container engine

pub mod connector;

pub use connector::DockerCliEngine;

//! Cloud provider integrations

pub mod aws;

pub use aws::EcrCredentialProvider;

//! Where task images go after they are built

pub mod credentials;
pub mod router;

pub use credentials::{ManagedRegistryLogin, RegistryCredentials};
pub use router::{RegistryRoute, RegistryRouter};

//! Image publication routing
//!
//! The route is decided once from configuration:
//!
//! | registry                                   | action                          |
//! |--------------------------------------------|---------------------------------|
//! | `<acct>.dkr.ecr.<region>.amazonaws.com`    | provider login, tag, push       |
//! | other host + credentials file              | file login, tag, push           |
//! | `localhost`, `127.0.0.1`, `[::1]`, `local` | load into the local cluster     |
//! | anything else                              | keep the image local            |

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::connectors::{ContainerEngine, RegistryCredentialProvider};
use crate::domain::entities::{ImageHandle, ImageReference};
use crate::error::Result;
use crate::registry::RegistryCredentials;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRoute {
    /// Cloud-managed registry reached with short-lived provider credentials,
    /// optionally resolved from a custom shared credentials file
    Managed {
        registry: String,
        credentials_file: Option<PathBuf>,
    },
    /// Registry with static credentials read from a file
    CredentialsFile {
        registry: String,
        login_server: String,
        credentials_file: PathBuf,
    },
    /// Single-node cluster that loads images directly into its cache
    LocalCluster,
    /// No publication; the image stays with the local build client
    LocalOnly,
}

/// Strip scheme and trailing slashes: `https://index.docker.io/v1/` becomes
/// `index.docker.io/v1`.
pub fn normalize_registry(registry: &str) -> String {
    let trimmed = registry.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

fn registry_host(registry: &str) -> &str {
    registry.split('/').next().unwrap_or(registry)
}

/// True for `<account digits>.dkr.ecr.<region>.amazonaws.com[:port]`
pub fn is_managed_registry(registry: &str) -> bool {
    let normalized = normalize_registry(registry);
    let host = registry_host(&normalized);
    let host = host.split(':').next().unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();

    matches!(
        labels.as_slice(),
        [account, "dkr", "ecr", region, "amazonaws", "com"]
            if !account.is_empty()
                && account.chars().all(|c| c.is_ascii_digit())
                && !region.is_empty()
    )
}

/// True for loopback registries and the literal `local`
pub fn is_local_registry(registry: &str) -> bool {
    let normalized = normalize_registry(registry);
    if normalized == "local" {
        return true;
    }

    let host = registry_host(&normalized);
    let host = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

impl RegistryRoute {
    pub fn select(registry: &str, credentials_file: Option<&PathBuf>) -> Self {
        let normalized = normalize_registry(registry);

        if normalized.is_empty() {
            return RegistryRoute::LocalOnly;
        }
        if is_managed_registry(&normalized) {
            return RegistryRoute::Managed {
                registry: normalized,
                credentials_file: credentials_file.cloned(),
            };
        }
        if is_local_registry(&normalized) {
            return RegistryRoute::LocalCluster;
        }
        match credentials_file {
            Some(path) => RegistryRoute::CredentialsFile {
                registry: normalized,
                login_server: registry.trim().to_string(),
                credentials_file: path.clone(),
            },
            None => RegistryRoute::LocalOnly,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegistryRoute::Managed { .. } => "managed",
            RegistryRoute::CredentialsFile { .. } => "credentials_file",
            RegistryRoute::LocalCluster => "local_cluster",
            RegistryRoute::LocalOnly => "local_only",
        }
    }
}

pub struct RegistryRouter {
    route: RegistryRoute,
    engine: Arc<dyn ContainerEngine>,
    provider: Arc<dyn RegistryCredentialProvider>,
}

impl RegistryRouter {
    pub fn new(
        route: RegistryRoute,
        engine: Arc<dyn ContainerEngine>,
        provider: Arc<dyn RegistryCredentialProvider>,
    ) -> Self {
        Self {
            route,
            engine,
            provider,
        }
    }

    pub fn route(&self) -> &RegistryRoute {
        &self.route
    }

    /// Make `image` available to the cluster and return the reference the
    /// job should use
    pub async fn publish(&self, image: &ImageHandle) -> Result<ImageReference> {
        let reference = match &self.route {
            RegistryRoute::Managed {
                registry,
                credentials_file,
            } => {
                let login = self
                    .provider
                    .managed_login(registry, credentials_file.as_deref())
                    .await?;
                self.engine.login(&login.endpoint, &login.credentials).await?;

                let reference =
                    ImageReference::remote(&login.endpoint, &image.repository, &image.tag);
                self.push(image, &reference).await?;
                reference
            }
            RegistryRoute::CredentialsFile {
                registry,
                login_server,
                credentials_file,
            } => {
                let credentials = RegistryCredentials::load_from_file(credentials_file).await?;
                self.engine.login(login_server, &credentials).await?;

                let reference = ImageReference::remote(registry, &image.repository, &image.tag);
                self.push(image, &reference).await?;
                reference
            }
            RegistryRoute::LocalCluster => {
                let reference = ImageReference::local(&image.repository, &image.tag);
                self.engine
                    .load_into_local_cluster(&reference.to_string())
                    .await?;
                reference
            }
            RegistryRoute::LocalOnly => ImageReference::local(&image.repository, &image.tag),
        };

        info!(
            route = self.route.name(),
            image = %reference,
            pull_policy = ?reference.pull_policy(),
            "Image published"
        );
        Ok(reference)
    }

    async fn push(&self, image: &ImageHandle, reference: &ImageReference) -> Result<()> {
        let target = reference.to_string();
        self.engine.tag_image(&image.local_name(), &target).await?;
        self.engine.push_image(&target).await
    }
}

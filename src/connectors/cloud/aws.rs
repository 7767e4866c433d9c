//! Managed registry credentials from Amazon ECR

use async_trait::async_trait;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ecr::config::Region;
use base64ct::{Base64, Encoding};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connectors::RegistryCredentialProvider;
use crate::error::{ExecutorError, Result};
use crate::registry::router::normalize_registry;
use crate::registry::{ManagedRegistryLogin, RegistryCredentials};

/// ECR always issues tokens for this user
const ECR_USERNAME: &str = "AWS";

/// Loads the AWS SDK configuration on first use, so executors that never
/// publish to a managed registry never resolve AWS credentials. One
/// configuration is kept per shared credentials file.
pub struct EcrCredentialProvider {
    fixed: Option<SdkConfig>,
    loaded: Mutex<HashMap<Option<PathBuf>, SdkConfig>>,
}

impl EcrCredentialProvider {
    /// Resolve credentials the standard way (environment, profile files,
    /// instance metadata) when first needed
    pub fn new() -> Self {
        Self {
            fixed: None,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Always use `sdk_config`; credentials files passed to
    /// `managed_login` are ignored
    pub fn with_sdk_config(sdk_config: SdkConfig) -> Self {
        Self {
            fixed: Some(sdk_config),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    async fn sdk_config(&self, credentials_file: Option<&Path>) -> SdkConfig {
        if let Some(config) = &self.fixed {
            return config.clone();
        }

        let key = credentials_file.map(Path::to_path_buf);
        let mut loaded = self.loaded.lock().await;
        if let Some(config) = loaded.get(&key) {
            return config.clone();
        }

        let config = load_sdk_config(credentials_file).await;
        loaded.insert(key, config.clone());
        config
    }

    async fn client_for(
        &self,
        region: Option<&str>,
        credentials_file: Option<&Path>,
    ) -> aws_sdk_ecr::Client {
        let sdk_config = self.sdk_config(credentials_file).await;

        let mut builder = aws_sdk_ecr::config::Builder::from(&sdk_config);
        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }
        aws_sdk_ecr::Client::from_conf(builder.build())
    }
}

impl Default for EcrCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Profile files with `credentials_file` in place of the default shared
/// credentials file; the default config file is still read
pub fn profile_files_for(credentials_file: &Path) -> ProfileFiles {
    ProfileFiles::builder()
        .include_default_config_file(true)
        .with_file(ProfileFileKind::Credentials, credentials_file)
        .build()
}

async fn load_sdk_config(credentials_file: Option<&Path>) -> SdkConfig {
    let loader = aws_config::defaults(BehaviorVersion::latest());
    match credentials_file {
        Some(path) => {
            debug!(path = %path.display(), "Using custom AWS shared credentials file");
            loader.profile_files(profile_files_for(path)).load().await
        }
        None => loader.load().await,
    }
}

/// Split `<account>.dkr.ecr.<region>.amazonaws.com` into account and region
pub fn parse_registry_host(registry: &str) -> Option<(String, String)> {
    let normalized = normalize_registry(registry);
    let host = normalized.split('/').next().unwrap_or(&normalized);
    let host = host.split(':').next().unwrap_or(host);

    match host.split('.').collect::<Vec<_>>().as_slice() {
        [account, "dkr", "ecr", region, "amazonaws", "com"] => {
            Some((account.to_string(), region.to_string()))
        }
        _ => None,
    }
}

/// Decode an ECR authorization token (`base64("AWS:<password>")`) into
/// registry credentials
pub fn decode_authorization_token(token: &str) -> Result<RegistryCredentials> {
    let decoded = Base64::decode_vec(token.trim()).map_err(|e| {
        ExecutorError::PublishError(format!("malformed registry authorization token: {}", e))
    })?;
    let decoded = String::from_utf8(decoded).map_err(|_| {
        ExecutorError::PublishError("registry authorization token is not UTF-8".to_string())
    })?;

    let password = decoded
        .strip_prefix(ECR_USERNAME)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| {
            ExecutorError::PublishError(
                "registry authorization token has no user prefix".to_string(),
            )
        })?;

    Ok(RegistryCredentials::new(ECR_USERNAME, password))
}

#[async_trait]
impl RegistryCredentialProvider for EcrCredentialProvider {
    async fn managed_login(
        &self,
        registry: &str,
        credentials_file: Option<&Path>,
    ) -> Result<ManagedRegistryLogin> {
        let parsed = parse_registry_host(registry);
        let client = self
            .client_for(
                parsed.as_ref().map(|(_, region)| region.as_str()),
                credentials_file,
            )
            .await;

        let mut request = client.get_authorization_token();
        if let Some((account, _)) = &parsed {
            request = request.registry_ids(account.clone());
        }

        debug!(registry = registry, "Requesting registry authorization token");
        let output = request.send().await.map_err(|e| {
            ExecutorError::PublishError(format!(
                "failed to get authorization token for {}: {}",
                registry, e
            ))
        })?;

        let data = output.authorization_data().first().ok_or_else(|| {
            ExecutorError::PublishError(format!("no authorization data returned for {}", registry))
        })?;
        let token = data.authorization_token().ok_or_else(|| {
            ExecutorError::PublishError(format!("empty authorization token for {}", registry))
        })?;

        let endpoint = data
            .proxy_endpoint()
            .map(normalize_registry)
            .unwrap_or_else(|| normalize_registry(registry));

        info!(registry = %endpoint, "Obtained managed registry credentials");
        Ok(ManagedRegistryLogin {
            endpoint,
            credentials: decode_authorization_token(token)?,
        })
    }
}

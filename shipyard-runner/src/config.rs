//! Runner configuration
//!
//! Defines every input of a deployment run: where the artifacts and the
//! service source live, how the image is named, where it is deployed, and the
//! retry and timeout bounds of the network-bound stages.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use shipyard_core::domain::config::REQUIRED_KEYS;

/// Registry credentials injected by the caller
///
/// The password is never printed by `Debug`.
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runner configuration
///
/// All timeouts and retry bounds are configurable to allow tuning for
/// different clusters and registries.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory holding trained model artifacts
    pub artifact_repo: PathBuf,

    /// Build context: service source, receives the config bundle and artifact
    pub build_context: PathBuf,

    /// Service name, used as image repository, deployment name and URL prefix
    pub service_name: String,

    /// API version of the prediction route
    pub api_version: String,

    /// Extra runtime parameters written into the config bundle
    pub params: BTreeMap<String, String>,

    /// Registry host (and optional namespace), e.g. `quay.io/acme`
    pub registry: String,

    /// Image tag label
    pub channel: String,

    /// Credentials for the registry, if it requires authentication
    pub credentials: Option<RegistryCredentials>,

    /// Additional push attempts after a transient failure
    pub push_retries: u32,

    /// Delay before the first push retry, doubled on each attempt
    pub push_backoff: Duration,

    /// Cluster namespace to deploy into
    pub namespace: String,

    /// Desired number of ready replicas
    pub replicas: u32,

    /// Port exposed by the load-balanced service
    pub port: u16,

    /// Port the inference service listens on in the container
    pub container_port: u16,

    /// Optional deployment template file; the built-in template is used otherwise
    pub template: Option<PathBuf>,

    /// Maximum time to wait for the deployment to become ready
    pub readiness_timeout: Duration,

    /// How often the deployment status is polled
    pub poll_interval: Duration,

    /// Optional JSON file with the smoke test payload
    pub payload: Option<PathBuf>,

    /// Timeout of the smoke test request
    pub verify_timeout: Duration,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(
        artifact_repo: impl Into<PathBuf>,
        build_context: impl Into<PathBuf>,
        service_name: impl Into<String>,
        registry: impl Into<String>,
    ) -> Self {
        Self {
            artifact_repo: artifact_repo.into(),
            build_context: build_context.into(),
            service_name: service_name.into(),
            api_version: "1".to_string(),
            params: BTreeMap::new(),
            registry: registry.into(),
            channel: "latest".to_string(),
            credentials: None,
            push_retries: 3,
            push_backoff: Duration::from_millis(500),
            namespace: "default".to_string(),
            replicas: 1,
            port: 80,
            container_port: 5000,
            template: None,
            readiness_timeout: Duration::from_secs(300), // 5 minutes
            poll_interval: Duration::from_secs(5),
            payload: None,
            verify_timeout: Duration::from_secs(30),
        }
    }

    /// Adds a runtime parameter to the config bundle
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_dns_label(&self.service_name) {
            anyhow::bail!(
                "service_name '{}' must be a lowercase DNS label (a-z, 0-9, '-', at most 63 chars)",
                self.service_name
            );
        }

        if self.api_version.trim().is_empty() {
            anyhow::bail!("api_version cannot be empty");
        }

        if self.registry.trim().is_empty() {
            anyhow::bail!("registry cannot be empty");
        }

        if self.channel.trim().is_empty() || self.channel.contains(['/', ':', '@']) {
            anyhow::bail!("channel '{}' is not a valid image tag", self.channel);
        }

        if !is_dns_label(&self.namespace) {
            anyhow::bail!("namespace '{}' must be a lowercase DNS label", self.namespace);
        }

        if self.replicas == 0 {
            anyhow::bail!("replicas must be greater than 0");
        }

        if self.port == 0 || self.container_port == 0 {
            anyhow::bail!("port and container_port must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.readiness_timeout < self.poll_interval {
            anyhow::bail!("readiness_timeout must be at least poll_interval");
        }

        for key in self.params.keys() {
            if REQUIRED_KEYS.contains(&key.as_str()) {
                anyhow::bail!("parameter {} is set from the service settings", key);
            }
        }

        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() {
                anyhow::bail!("registry username cannot be empty when credentials are given");
            }
        }

        Ok(())
    }
}

/// RFC 1123 label: what both the orchestrator and image repositories accept
fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

//! Cluster orchestrator access through kubectl
//!
//! Manifests are submitted with `kubectl apply`, which creates a resource the
//! first time and updates it in place afterwards. Status is read back as JSON
//! and deserialized, never scraped from human-readable output.

use async_trait::async_trait;
use serde::Deserialize;
use shipyard_core::domain::deployment::ServiceEndpoint;
use tracing::{debug, info};

use crate::tool::{self, ToolError};

/// Rollout state of a deployment as reported by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeploymentStatus {
    pub desired: u32,
    /// All pods of the deployment, old and new
    pub total: u32,
    pub ready: u32,
    pub available: u32,
    pub updated: u32,
    pub generation: i64,
    pub observed_generation: i64,
}

impl DeploymentStatus {
    /// Whether the latest spec has fully rolled out with `replicas` replicas
    ///
    /// Old pods still running mid-rollout keep the deployment not ready even
    /// when enough pods report ready: they may serve the previous image.
    pub fn is_ready(&self, replicas: u32) -> bool {
        self.observed_generation >= self.generation
            && self.updated >= replicas
            && self.total <= self.updated
            && self.available >= self.updated
            && self.ready >= replicas
    }
}

/// Orchestrator operations used by the deployment stage
#[async_trait]
pub trait ClusterOrchestrator: Send + Sync {
    /// Creates or updates every resource in `manifest`
    async fn apply(&self, manifest: &str) -> Result<(), ToolError>;

    /// Rollout status of a deployment, `None` if it does not exist
    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentStatus>, ToolError>;

    /// Reachable address of a service, `None` while it has none yet
    async fn service_endpoint(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceEndpoint>, ToolError>;
}

/// `ClusterOrchestrator` backed by the kubectl CLI
#[derive(Debug, Clone)]
pub struct KubectlOrchestrator {
    program: String,
}

impl KubectlOrchestrator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `kubectl get <kind> <name> -o json`, `None` if the resource is absent
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<T>, ToolError> {
        let output = tool::run(
            &self.program,
            &[
                "get",
                kind,
                name,
                "--namespace",
                namespace,
                "--ignore-not-found",
                "--output",
                "json",
            ],
            None,
        )
        .await?;

        let raw = output.stdout.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| ToolError::Output {
                program: self.program.clone(),
                message: format!("failed to parse {} {}: {}", kind, name, e),
            })
    }
}

impl Default for KubectlOrchestrator {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

#[async_trait]
impl ClusterOrchestrator for KubectlOrchestrator {
    async fn apply(&self, manifest: &str) -> Result<(), ToolError> {
        let output = tool::run(
            &self.program,
            &["apply", "--filename", "-"],
            Some(manifest.as_bytes()),
        )
        .await?;

        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            info!("{}", line.trim());
        }
        Ok(())
    }

    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentStatus>, ToolError> {
        let deployment: Option<DeploymentObject> =
            self.get_json("deployment", namespace, name).await?;

        let status = deployment.map(DeploymentObject::into_status);
        debug!("Deployment {}/{} status: {:?}", namespace, name, status);
        Ok(status)
    }

    async fn service_endpoint(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceEndpoint>, ToolError> {
        let service: Option<ServiceObject> = self.get_json("service", namespace, name).await?;
        Ok(service.and_then(ServiceObject::into_endpoint))
    }
}

// =============================================================================
// kubectl JSON shapes (only the fields read here)
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentObject {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: DeploymentSpec,
    #[serde(default)]
    status: DeploymentStatusObject,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    generation: i64,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentSpec {
    replicas: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatusObject {
    #[serde(default)]
    observed_generation: i64,
    #[serde(default)]
    replicas: u32,
    #[serde(default)]
    ready_replicas: u32,
    #[serde(default)]
    available_replicas: u32,
    #[serde(default)]
    updated_replicas: u32,
}

impl DeploymentObject {
    fn into_status(self) -> DeploymentStatus {
        DeploymentStatus {
            // The orchestrator defaults an unset replica count to 1
            desired: self.spec.replicas.unwrap_or(1),
            total: self.status.replicas,
            ready: self.status.ready_replicas,
            available: self.status.available_replicas,
            updated: self.status.updated_replicas,
            generation: self.metadata.generation,
            observed_generation: self.status.observed_generation,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceObject {
    #[serde(default)]
    spec: ServiceSpec,
    #[serde(default)]
    status: ServiceStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceSpec {
    #[serde(rename = "type")]
    service_type: Option<String>,
    #[serde(rename = "clusterIP")]
    cluster_ip: Option<String>,
    #[serde(default)]
    ports: Vec<ServicePort>,
}

#[derive(Debug, Deserialize)]
struct ServicePort {
    port: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceStatus {
    #[serde(default)]
    load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Default, Deserialize)]
struct LoadBalancerStatus {
    #[serde(default)]
    ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Deserialize)]
struct LoadBalancerIngress {
    ip: Option<String>,
    hostname: Option<String>,
}

impl ServiceObject {
    /// Load balancer ingress first; a pending load balancer has no endpoint
    /// yet. Other service types fall back to the cluster IP.
    fn into_endpoint(self) -> Option<ServiceEndpoint> {
        let port = self.spec.ports.first()?.port;

        let ingress = self
            .status
            .load_balancer
            .ingress
            .into_iter()
            .find_map(|i| i.ip.or(i.hostname));
        if let Some(host) = ingress {
            return Some(ServiceEndpoint::new(host, port));
        }

        if self.spec.service_type.as_deref() == Some("LoadBalancer") {
            return None;
        }

        self.spec
            .cluster_ip
            .filter(|ip| !ip.is_empty() && ip != "None")
            .map(|ip| ServiceEndpoint::new(ip, port))
    }
}

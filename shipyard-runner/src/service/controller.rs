//! Deployment control
//!
//! Submits the rendered template to the orchestrator and waits for the
//! rollout. A deployment that never becomes ready is left in place; nothing is
//! rolled back.

use shipyard_core::StageError;
use shipyard_core::domain::deployment::{DeploymentDescriptor, ServiceEndpoint};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::kubectl::{ClusterOrchestrator, DeploymentStatus};
use crate::service::template::DeploymentTemplate;

/// Readiness polling bounds and template location
#[derive(Debug, Clone)]
pub struct ReadinessSettings {
    pub template: Option<PathBuf>,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Deploys the published image
pub struct DeploymentController {
    cluster: Arc<dyn ClusterOrchestrator>,
    settings: ReadinessSettings,
}

impl DeploymentController {
    pub fn new(cluster: Arc<dyn ClusterOrchestrator>, settings: ReadinessSettings) -> Self {
        Self { cluster, settings }
    }

    /// Applies the deployment and returns its endpoint once ready
    ///
    /// Applying an existing (service name, namespace) pair updates it in place.
    pub async fn deploy(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> Result<ServiceEndpoint, StageError> {
        let template = DeploymentTemplate::load(self.settings.template.as_deref())?;
        let manifest = template.render(descriptor)?;

        info!(
            "Applying deployment {}/{} with image {}",
            descriptor.namespace,
            descriptor.service_name,
            descriptor.image.pinned()
        );
        self.cluster
            .apply(&manifest)
            .await
            .map_err(|e| StageError::Deployment(e.diagnostic()))?;

        let deadline = Instant::now() + self.settings.timeout;
        self.wait_until_ready(descriptor, deadline).await?;
        self.resolve_endpoint(descriptor, deadline).await
    }

    /// Polls until the desired replicas are ready or `deadline` passes
    async fn wait_until_ready(
        &self,
        descriptor: &DeploymentDescriptor,
        deadline: Instant,
    ) -> Result<(), StageError> {
        let mut last_seen = String::from("no status reported");

        loop {
            match self
                .cluster
                .deployment_status(&descriptor.namespace, &descriptor.service_name)
                .await
            {
                Ok(Some(status)) if status.is_ready(descriptor.replicas) => {
                    info!(
                        "Deployment {}/{} ready: {}/{} replica(s)",
                        descriptor.namespace, descriptor.service_name, status.ready, status.desired
                    );
                    return Ok(());
                }
                Ok(Some(status)) => {
                    last_seen = describe(&status);
                    debug!("Waiting for rollout: {}", last_seen);
                }
                Ok(None) => {
                    last_seen = "deployment not found".to_string();
                    debug!("Deployment not visible yet");
                }
                Err(e) => {
                    last_seen = e.diagnostic();
                    warn!("Failed to read deployment status: {}", e);
                }
            }

            self.sleep_or_timeout(descriptor, deadline, &last_seen)
                .await?;
        }
    }

    /// Polls until the service reports a reachable address
    async fn resolve_endpoint(
        &self,
        descriptor: &DeploymentDescriptor,
        deadline: Instant,
    ) -> Result<ServiceEndpoint, StageError> {
        loop {
            let last_seen = match self
                .cluster
                .service_endpoint(&descriptor.namespace, &descriptor.service_name)
                .await
            {
                Ok(Some(endpoint)) => {
                    info!("Service endpoint resolved: {}", endpoint);
                    return Ok(endpoint);
                }
                Ok(None) => "service has no reachable address yet".to_string(),
                Err(e) => {
                    warn!("Failed to read service endpoint: {}", e);
                    e.diagnostic()
                }
            };

            self.sleep_or_timeout(descriptor, deadline, &last_seen)
                .await?;
        }
    }

    async fn sleep_or_timeout(
        &self,
        descriptor: &DeploymentDescriptor,
        deadline: Instant,
        last_seen: &str,
    ) -> Result<(), StageError> {
        let now = Instant::now();
        if now >= deadline {
            return Err(StageError::ReadinessTimeout {
                waited_secs: self.settings.timeout.as_secs(),
                message: format!(
                    "{}/{} (left in place): {}",
                    descriptor.namespace, descriptor.service_name, last_seen
                ),
            });
        }

        time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        Ok(())
    }
}

fn describe(status: &DeploymentStatus) -> String {
    format!(
        "{}/{} ready, {} updated, {} available, {} total, generation {} observed {}",
        status.ready,
        status.desired,
        status.updated,
        status.available,
        status.total,
        status.generation,
        status.observed_generation
    )
}

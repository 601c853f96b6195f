//! Pipeline orchestration
//!
//! Runs the six stages in order, recording each outcome on a `PipelineRun`:
//!
//! Selecting -> Configuring -> Building -> Publishing -> Deploying -> Verifying
//!
//! The first failure ends the run. Effects of completed stages (a pushed image,
//! a submitted deployment) are left as they are. Cancellation is only observed
//! between stages; a stage in flight always runs to completion.

use chrono::Utc;
use serde_json::Value as JsonValue;
use shipyard_core::StageError;
use shipyard_core::domain::deployment::DeploymentDescriptor;
use shipyard_core::domain::image::ImageReference;
use shipyard_core::domain::run::{PipelineRun, Stage};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use crate::config::RunnerConfig;
use crate::kubectl::ClusterOrchestrator;
use crate::podman::ContainerEngine;
use crate::service::{
    ArtifactSelector, ConfigMaterializer, DeploymentController, ImageBuilder, PublishSettings,
    ReadinessSettings, RegistryPublisher, Verifier, sample_payload,
};

/// Cooperative cancellation, checked at stage boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// End-to-end deployment pipeline
pub struct Pipeline {
    config: RunnerConfig,
    engine: Arc<dyn ContainerEngine>,
    cluster: Arc<dyn ClusterOrchestrator>,
    cancel: CancelFlag,
}

impl Pipeline {
    /// Creates a new pipeline
    ///
    /// # Arguments
    /// * `config` - Inputs of the run
    /// * `engine` - Container engine used to build and push the image
    /// * `cluster` - Orchestrator the service is deployed to
    pub fn new(
        config: RunnerConfig,
        engine: Arc<dyn ContainerEngine>,
        cluster: Arc<dyn ClusterOrchestrator>,
    ) -> Self {
        Self {
            config,
            engine,
            cluster,
            cancel: CancelFlag::new(),
        }
    }

    /// Uses `cancel` instead of a private flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Executes one run and returns its record
    ///
    /// Failures are recorded on the run rather than returned: the result is
    /// always a terminal `PipelineRun`.
    pub async fn run(&self) -> PipelineRun {
        let mut run = PipelineRun::new();
        let config = &self.config;

        info!(
            "Starting run {} for service '{}'",
            run.id, config.service_name
        );

        let selector = ArtifactSelector::new();
        let Some(artifact) = self
            .stage(&mut run, selector.select(&config.artifact_repo))
            .await
        else {
            return run;
        };

        let materializer = ConfigMaterializer::for_build_context(&config.build_context);
        let Some(_service_config) = self
            .stage(&mut run, async {
                materializer.materialize(&config.service_name, &config.api_version, &config.params)
            })
            .await
        else {
            return run;
        };

        let builder = ImageBuilder::new(Arc::clone(&self.engine));
        let image = ImageReference::new(&config.registry, &config.service_name, &config.channel);
        let Some(built) = self
            .stage(
                &mut run,
                builder.build(&config.build_context, &artifact, image),
            )
            .await
        else {
            return run;
        };

        let publisher = RegistryPublisher::new(
            Arc::clone(&self.engine),
            PublishSettings {
                credentials: config.credentials.clone(),
                retries: config.push_retries,
                backoff: config.push_backoff,
            },
        );
        let Some(published) = self.stage(&mut run, publisher.publish(built)).await else {
            return run;
        };

        let controller = DeploymentController::new(
            Arc::clone(&self.cluster),
            ReadinessSettings {
                template: config.template.clone(),
                poll_interval: config.poll_interval,
                timeout: config.readiness_timeout,
            },
        );
        let descriptor = DeploymentDescriptor {
            service_name: config.service_name.clone(),
            namespace: config.namespace.clone(),
            replicas: config.replicas,
            port: config.port,
            container_port: config.container_port,
            image: published,
        };
        let Some(endpoint) = self
            .stage(&mut run, controller.deploy(&descriptor))
            .await
        else {
            return run;
        };

        let verifier = Verifier::new(config.verify_timeout);
        let _report = self
            .stage(&mut run, async {
                let payload = self.load_payload().await?;
                verifier
                    .verify(&endpoint, &config.service_name, &config.api_version, &payload)
                    .await
            })
            .await;

        if run.succeeded() {
            info!("Run {} succeeded", run.id);
        }
        run
    }

    /// Runs the current stage unless the run was cancelled, and records the
    /// outcome
    async fn stage<T, Fut>(&self, run: &mut PipelineRun, work: Fut) -> Option<T>
    where
        T: Display,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let stage = run.current_stage()?;
        let started_at = Utc::now();

        if self.cancel.is_cancelled() {
            warn!("Run {} cancelled before stage '{}'", run.id, stage);
            run.record_failure(
                started_at,
                &StageError::Cancelled(format!("cancelled before stage '{}'", stage)),
            );
            return None;
        }

        info!(
            "Stage {}/{}: {}",
            stage.position(),
            Stage::ALL.len(),
            stage
        );

        match work.await {
            Ok(output) => {
                info!("Stage '{}' completed: {}", stage, output);
                run.record_success(started_at, output.to_string());
                Some(output)
            }
            Err(e) => {
                error!("Stage '{}' failed: {}", stage, e);
                run.record_failure(started_at, &e);
                None
            }
        }
    }

    /// Caller-supplied payload file, or the built-in sample
    async fn load_payload(&self) -> Result<JsonValue, StageError> {
        let Some(path) = &self.config.payload else {
            return Ok(sample_payload());
        };

        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            StageError::Verification(format!("cannot read payload {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            StageError::Verification(format!("payload {} is not valid JSON: {}", path.display(), e))
        })
    }
}

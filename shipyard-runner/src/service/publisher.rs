//! Registry publishing
//!
//! Pushes the built image and checks that the registry serves the pushed tag
//! under the digest the push reported. Transient network
//! failures are retried with exponential backoff; everything else is terminal.

use shipyard_core::StageError;
use shipyard_core::domain::image::ImageReference;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::RegistryCredentials;
use crate::podman::ContainerEngine;
use crate::tool::ToolError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Publisher settings
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub credentials: Option<RegistryCredentials>,
    /// Additional attempts after a transient failure
    pub retries: u32,
    /// Delay before the first retry, doubled on each attempt
    pub backoff: Duration,
}

/// Publishes images to the registry
pub struct RegistryPublisher {
    engine: Arc<dyn ContainerEngine>,
    settings: PublishSettings,
}

impl RegistryPublisher {
    pub fn new(engine: Arc<dyn ContainerEngine>, settings: PublishSettings) -> Self {
        Self { engine, settings }
    }

    /// Pushes `image` and returns it with the registry-confirmed digest
    pub async fn publish(&self, image: ImageReference) -> Result<ImageReference, StageError> {
        if let Some(credentials) = &self.settings.credentials {
            self.with_retry("login", || self.engine.login(&image.registry, credentials))
                .await
                .map_err(|e| StageError::publish(e.diagnostic(), false))?;
        }

        let reference = image.tagged();
        let digest = self
            .with_retry("push", || self.engine.push(&reference))
            .await
            .map_err(|e| StageError::publish(e.diagnostic(), e.is_transient()))?;

        // The digest the push reported must be what the registry now serves
        // for the tag
        let served = self
            .with_retry("registry lookup", || self.engine.registry_digest(&reference))
            .await
            .map_err(|e| StageError::publish(e.diagnostic(), e.is_transient()))?;

        if served != digest {
            error!(
                "Digest mismatch for {}: push reported {}, registry serves {}",
                reference, digest, served
            );
            return Err(StageError::publish(
                format!(
                    "digest mismatch for {}: push reported {}, registry serves {}",
                    reference, digest, served
                ),
                false,
            ));
        }

        info!("Published {} ({})", reference, digest);
        Ok(ImageReference {
            digest: Some(digest),
            ..image
        })
    }

    /// Runs `op`, retrying transient failures with exponential backoff and cap
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ToolError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let max_attempts = self.settings.retries + 1;
        let mut attempt = 0;
        let mut delay = self.settings.backoff;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded after {} attempt(s)", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what, attempt, max_attempts, e
                    );
                    warn!("Retrying in {} ms...", delay.as_millis());

                    tokio::time::sleep(delay).await;

                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                Err(e) => {
                    if e.is_transient() {
                        error!("{} failed after {} attempt(s)", what, attempt);
                    }
                    return Err(e);
                }
            }
        }
    }
}

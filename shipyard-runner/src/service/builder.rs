//! Image building
//!
//! Copies the selected artifact into the build context and builds the service
//! image through the container engine.

use shipyard_core::StageError;
use shipyard_core::domain::artifact::ArtifactReference;
use shipyard_core::domain::image::ImageReference;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::atomic;
use crate::podman::ContainerEngine;

/// Path of the artifact inside the build context, agreed with the service's
/// build instructions
pub const ARTIFACT_PATH: &str = "model/model.pkl";

/// Builds the service image
pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
}

impl ImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Stages `artifact` into `context` and builds `image`
    ///
    /// Returns `image` with its local image id filled in.
    pub async fn build(
        &self,
        context: &Path,
        artifact: &ArtifactReference,
        image: ImageReference,
    ) -> Result<ImageReference, StageError> {
        if !context.is_dir() {
            return Err(StageError::Build(format!(
                "build context {} is not a directory",
                context.display()
            )));
        }

        self.stage_artifact(context, artifact)?;

        let tag = image.tagged();
        let image_id = self
            .engine
            .build(context, &tag)
            .await
            .map_err(|e| StageError::Build(e.diagnostic()))?;

        // Rebuilding a tag leaves the previous image dangling
        if let Err(e) = self.engine.prune_dangling().await {
            warn!("Failed to prune dangling images: {}", e);
        }

        Ok(ImageReference {
            image_id: Some(image_id),
            ..image
        })
    }

    /// Replaces the artifact in the build context with the selected one
    fn stage_artifact(&self, context: &Path, artifact: &ArtifactReference) -> Result<(), StageError> {
        let dest = context.join(ARTIFACT_PATH);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StageError::Build(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let bytes = atomic::copy_atomic(&artifact.path, &dest).map_err(|e| {
            StageError::Build(format!(
                "cannot copy {} to {}: {}",
                artifact.path.display(),
                dest.display(),
                e
            ))
        })?;

        info!(
            "Copied artifact {} ({} bytes) into build context",
            artifact.name, bytes
        );
        Ok(())
    }
}

//! Podman image management
//!
//! Handles the image side of a deployment:
//! - Checking podman availability
//! - Building a tagged image from a build context
//! - Pruning dangling images left behind by rebuilds
//! - Logging in to a registry and pushing an image
//! - Asking the registry which manifest digest a pushed tag resolves to
//!
//! The registry lookup goes through skopeo, which shares podman's
//! credential store, so a `podman login` covers both.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RegistryCredentials;
use crate::tool::{self, ToolError};

/// Container engine operations used by the build and publish stages
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Builds `context` into an image tagged `tag`, returning the image id
    async fn build(&self, context: &Path, tag: &str) -> Result<String, ToolError>;

    /// Removes dangling images
    async fn prune_dangling(&self) -> Result<(), ToolError>;

    /// Authenticates against `registry`
    async fn login(
        &self,
        registry: &str,
        credentials: &RegistryCredentials,
    ) -> Result<(), ToolError>;

    /// Pushes `reference`, returning the digest confirmed by the registry
    async fn push(&self, reference: &str) -> Result<String, ToolError>;

    /// Manifest digest the registry serves for `reference`
    async fn registry_digest(&self, reference: &str) -> Result<String, ToolError>;
}

/// `ContainerEngine` backed by the podman CLI
///
/// Any docker-compatible CLI that supports the same flags works too.
#[derive(Debug, Clone)]
pub struct PodmanEngine {
    program: String,
    inspector: String,
}

impl PodmanEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            inspector: "skopeo".to_string(),
        }
    }

    /// Uses `inspector` instead of `skopeo` for registry lookups
    pub fn with_inspector(mut self, inspector: impl Into<String>) -> Self {
        self.inspector = inspector.into();
        self
    }

    /// Checks that the engine is installed and answering
    pub async fn check_available(&self) -> Result<String, ToolError> {
        let output = tool::run(&self.program, &["--version"], None).await?;
        let version = output.stdout.trim().to_string();
        info!("Container engine is available: {}", version);
        Ok(version)
    }

    async fn image_id(&self, reference: &str) -> Result<String, ToolError> {
        let output = tool::run(
            &self.program,
            &["image", "inspect", "--format", "{{.Id}}", reference],
            None,
        )
        .await?;

        let id = output.stdout.trim();
        if id.is_empty() {
            return Err(ToolError::Output {
                program: self.program.clone(),
                message: format!("no image id reported for {}", reference),
            });
        }
        Ok(id.to_string())
    }
}

impl Default for PodmanEngine {
    fn default() -> Self {
        Self::new("podman")
    }
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn build(&self, context: &Path, tag: &str) -> Result<String, ToolError> {
        let context = context.to_string_lossy();
        info!("Building image {} from {}", tag, context);

        tool::run(&self.program, &["build", "-t", tag, &context], None).await?;

        let id = self.image_id(tag).await?;
        info!("Image {} built with ID: {}", tag, id);
        Ok(id)
    }

    async fn prune_dangling(&self) -> Result<(), ToolError> {
        let output = tool::run(&self.program, &["image", "prune", "-f"], None).await?;
        let pruned = output.stdout.lines().filter(|l| !l.trim().is_empty()).count();
        debug!("Pruned {} dangling image(s)", pruned);
        Ok(())
    }

    async fn login(
        &self,
        registry: &str,
        credentials: &RegistryCredentials,
    ) -> Result<(), ToolError> {
        info!("Logging in to {} as {}", registry, credentials.username);

        // Password goes through stdin so it never shows up in the process list
        tool::run(
            &self.program,
            &[
                "login",
                "--username",
                &credentials.username,
                "--password-stdin",
                registry,
            ],
            Some(credentials.password.as_bytes()),
        )
        .await?;

        Ok(())
    }

    async fn push(&self, reference: &str) -> Result<String, ToolError> {
        let digest_file = std::env::temp_dir().join(format!(
            "shipyard-digest-{}",
            Uuid::new_v4().simple()
        ));
        let digest_path = digest_file.to_string_lossy().to_string();

        info!("Pushing image {}", reference);
        let result = tool::run(
            &self.program,
            &["push", "--digestfile", &digest_path, reference],
            None,
        )
        .await;

        let digest = match result {
            Ok(_) => tokio::fs::read_to_string(&digest_file)
                .await
                .map(|d| d.trim().to_string())
                .map_err(|e| ToolError::Output {
                    program: self.program.clone(),
                    message: format!("failed to read digest file: {}", e),
                }),
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&digest_file).await;

        let digest = digest?;
        if !digest.starts_with("sha256:") {
            return Err(ToolError::Output {
                program: self.program.clone(),
                message: format!("registry returned malformed digest '{}'", digest),
            });
        }

        info!("Image {} pushed with digest {}", reference, digest);
        Ok(digest)
    }

    async fn registry_digest(&self, reference: &str) -> Result<String, ToolError> {
        let remote = format!("docker://{}", reference);
        let output = tool::run(
            &self.inspector,
            &["inspect", "--format", "{{.Digest}}", &remote],
            None,
        )
        .await?;

        let digest = output.stdout.trim();
        if !digest.starts_with("sha256:") {
            return Err(ToolError::Output {
                program: self.inspector.clone(),
                message: format!("no manifest digest reported for {}: '{}'", reference, digest),
            });
        }

        debug!("Registry serves {} as {}", reference, digest);
        Ok(digest.to_string())
    }
}

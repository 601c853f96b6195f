//! Artifact selection
//!
//! Picks the latest artifact from a flat repository directory. Artifact names
//! carry a sortable version token (e.g. `model-20240131T120000.pkl`), so the
//! latest one is the maximum file stem; equal stems are broken by full name.

use shipyard_core::StageError;
use shipyard_core::domain::artifact::ArtifactReference;
use std::path::Path;
use tracing::{debug, info};

/// Suffixes of files still being written by the training process
const IN_PROGRESS_SUFFIXES: [&str; 2] = [".tmp", ".part"];

/// Selects the artifact to deploy
#[derive(Debug, Default, Clone)]
pub struct ArtifactSelector;

impl ArtifactSelector {
    pub fn new() -> Self {
        Self
    }

    /// Returns the latest artifact in `repo`
    ///
    /// Fails with `NotFound` if the repository is missing, unreadable, or holds
    /// no artifacts.
    pub async fn select(&self, repo: &Path) -> Result<ArtifactReference, StageError> {
        let unreadable = |e: std::io::Error| {
            StageError::NotFound(format!(
                "cannot read artifact repository {}: {}",
                repo.display(),
                e
            ))
        };

        let mut entries = tokio::fs::read_dir(repo).await.map_err(unreadable)?;

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || IN_PROGRESS_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                debug!("Skipping {}", name);
                continue;
            }

            let version = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| name.clone());

            candidates.push(ArtifactReference {
                path,
                name,
                version,
            });
        }

        debug!(
            "Found {} artifact(s) in {}",
            candidates.len(),
            repo.display()
        );

        let latest = candidates
            .into_iter()
            .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)))
            .ok_or_else(|| {
                StageError::NotFound(format!(
                    "artifact repository {} is empty",
                    repo.display()
                ))
            })?;

        info!("Selected artifact {}", latest);
        Ok(latest)
    }
}

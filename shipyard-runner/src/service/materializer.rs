//! Configuration materialization
//!
//! Renders the service settings into the `.env` bundle the inference service
//! reads at container start, written into the build context so it is baked
//! into the image.

use shipyard_core::StageError;
use shipyard_core::domain::config::{REQUIRED_KEYS, ServiceConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::atomic;

/// File name of the bundle inside the build context
pub const CONFIG_FILE_NAME: &str = ".env";

/// Writes the service configuration bundle
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    destination: PathBuf,
}

impl ConfigMaterializer {
    /// Materializer writing to `<build_context>/.env`
    pub fn for_build_context(build_context: &Path) -> Self {
        Self {
            destination: build_context.join(CONFIG_FILE_NAME),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Builds the configuration and replaces the bundle on disk
    ///
    /// The previous bundle is replaced as a whole, so keys from an earlier run
    /// never survive.
    pub fn materialize(
        &self,
        service_name: &str,
        api_version: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<ServiceConfig, StageError> {
        let mut config = ServiceConfig::new(service_name, api_version);
        for (key, value) in params {
            if REQUIRED_KEYS.contains(&key.as_str()) {
                return Err(StageError::ConfigWrite(format!(
                    "parameter {} cannot override the service settings",
                    key
                )));
            }
            if !is_valid_key(key) {
                return Err(StageError::ConfigWrite(format!(
                    "invalid configuration key '{}'",
                    key
                )));
            }
            if value.contains(['\n', '\r']) {
                return Err(StageError::ConfigWrite(format!(
                    "value of {} must be a single line",
                    key
                )));
            }
            config = config.with_param(key, value);
        }

        let missing = config.missing_required();
        if !missing.is_empty() {
            return Err(StageError::ConfigWrite(format!(
                "required key(s) without a value: {}",
                missing.join(", ")
            )));
        }

        atomic::write_atomic(&self.destination, config.render().as_bytes()).map_err(|e| {
            StageError::ConfigWrite(format!(
                "cannot write {}: {}",
                self.destination.display(),
                e
            ))
        })?;

        info!(
            "Wrote {} configuration key(s) to {}",
            config.len(),
            self.destination.display()
        );
        Ok(config)
    }
}

/// Environment-variable style key: `[A-Z_][A-Z0-9_]*`
fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

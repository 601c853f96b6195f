//! Container image domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A container image addressed as `<registry>/<repository>:<tag>`
///
/// The builder fills in `image_id`; the publisher fills in `digest` once the
/// registry has confirmed the push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: String,
    /// Repository name, which is the service name
    pub repository: String,
    /// Channel label, e.g. `latest`
    pub tag: String,
    /// Local image id reported by the container engine
    pub image_id: Option<String>,
    /// Registry-confirmed content digest (`sha256:...`)
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
            image_id: None,
            digest: None,
        }
    }

    /// `<registry>/<repository>` without tag or digest
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry.trim_end_matches('/'), self.repository)
    }

    /// `<registry>/<repository>:<tag>`
    pub fn tagged(&self) -> String {
        format!("{}:{}", self.name(), self.tag)
    }

    /// Digest-pinned reference when the digest is known, tagged otherwise
    pub fn pinned(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.name(), digest),
            None => self.tagged(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.digest {
            Some(digest) => write!(f, "{} ({})", self.tagged(), digest),
            None => write!(f, "{}", self.tagged()),
        }
    }
}

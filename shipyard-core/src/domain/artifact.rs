//! Model artifact domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A trained model artifact picked from a versioned repository
///
/// Produced by an external training process and never modified here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Full path to the artifact file
    pub path: PathBuf,
    /// File name including extension (secondary ordering key)
    pub name: String,
    /// Sortable version token, e.g. `model-20240131T120000`
    pub version: String,
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (version {})", self.path.display(), self.version)
    }
}

//! Service layer
//!
//! One service per pipeline stage. Each consumes the previous stage's output
//! and fails with its own `StageError` kind, carrying the underlying diagnostic
//! verbatim.

mod builder;
mod controller;
mod materializer;
mod publisher;
mod selector;
mod template;
mod verifier;

pub use builder::{ARTIFACT_PATH, ImageBuilder};
pub use controller::{DeploymentController, ReadinessSettings};
pub use materializer::{CONFIG_FILE_NAME, ConfigMaterializer};
pub use publisher::{PublishSettings, RegistryPublisher};
pub use selector::ArtifactSelector;
pub use template::DeploymentTemplate;
pub use verifier::{VerificationReport, Verifier, sample_payload};

//! Core domain types
//!
//! Each stage of a deployment run consumes the previous stage's output:
//! `ArtifactReference` -> `ServiceConfig` -> `ImageReference` ->
//! `DeploymentDescriptor` -> `ServiceEndpoint`. The `PipelineRun` records
//! what happened to each of them.

pub mod artifact;
pub mod config;
pub mod deployment;
pub mod image;
pub mod run;

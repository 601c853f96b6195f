//! Shipyard Runner
//!
//! Promotes a trained model artifact into a running inference service.
//!
//! Architecture:
//! - Configuration: every input of a run, validated up front
//! - Tool drivers: podman (image build/push) and kubectl (deployment), both
//!   behind traits so stages can be exercised without the real tools
//! - Services: one per stage (select, configure, build, publish, deploy, verify)
//! - Pipeline: the state machine sequencing the stages, fail-fast
//!
//! Stages run strictly in order, each consuming the previous stage's output.
//! A failed run leaves every side effect already applied (a pushed image, a
//! submitted deployment) in place for inspection.

pub mod config;
pub mod kubectl;
pub mod pipeline;
pub mod podman;
pub mod service;

mod atomic;
mod tool;

pub use config::{RegistryCredentials, RunnerConfig};
pub use kubectl::{ClusterOrchestrator, DeploymentStatus, KubectlOrchestrator};
pub use pipeline::{CancelFlag, Pipeline};
pub use podman::{ContainerEngine, PodmanEngine};
pub use tool::ToolError;

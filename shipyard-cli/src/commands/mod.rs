//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deploy;

pub use deploy::DeployArgs;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Select the latest model, build, publish, deploy and verify it
    Deploy(DeployArgs),
}

/// Handle a CLI command
///
/// Returns the process exit code: success only when the command's work
/// succeeded. Errors are reserved for invalid invocations.
pub async fn handle_command(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Deploy(args) => deploy::handle_deploy(args).await,
    }
}

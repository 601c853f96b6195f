//! Deploy command handler
//!
//! Runs the deployment pipeline once and reports each stage. The process
//! exits non-zero when any stage failed, with the failing stage, the error
//! kind and the raw diagnostic on stderr.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use shipyard_core::domain::run::{PipelineRun, RunStatus, StageResult};
use shipyard_runner::{
    CancelFlag, KubectlOrchestrator, Pipeline, PodmanEngine, RegistryCredentials, RunnerConfig,
};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Exit status of a run aborted by a second Ctrl-C (128 + SIGINT)
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Deployment inputs, as flags or environment variables
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Directory holding trained model artifacts
    #[arg(long, env = "SHIPYARD_ARTIFACT_REPO")]
    artifact_repo: PathBuf,

    /// Service source directory used as the image build context
    #[arg(long, env = "SHIPYARD_BUILD_CONTEXT")]
    build_context: PathBuf,

    /// Service name (image repository, deployment name, URL prefix)
    #[arg(long, env = "SHIPYARD_SERVICE_NAME")]
    service_name: String,

    /// API version of the prediction route
    #[arg(long, env = "SHIPYARD_API_VERSION", default_value = "1")]
    api_version: String,

    /// Extra configuration as KEY=value pairs (e.g., WORKERS=2)
    #[arg(short, long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    /// Registry to publish to (e.g., quay.io/acme)
    #[arg(long, env = "SHIPYARD_REGISTRY")]
    registry: String,

    /// Image tag label
    #[arg(long, env = "SHIPYARD_CHANNEL", default_value = "latest")]
    channel: String,

    /// Registry user name
    #[arg(long, env = "SHIPYARD_REGISTRY_USERNAME")]
    registry_username: Option<String>,

    /// Registry password or token
    #[arg(long, env = "SHIPYARD_REGISTRY_PASSWORD", hide_env_values = true)]
    registry_password: Option<String>,

    /// Additional push attempts after a transient failure
    #[arg(long, env = "SHIPYARD_PUSH_RETRIES", default_value = "3")]
    push_retries: u32,

    /// Delay before the first push retry, in milliseconds
    #[arg(long, env = "SHIPYARD_PUSH_BACKOFF_MS", default_value = "500")]
    push_backoff_ms: u64,

    /// Namespace to deploy into
    #[arg(long, env = "SHIPYARD_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Desired number of ready replicas
    #[arg(long, env = "SHIPYARD_REPLICAS", default_value = "1")]
    replicas: u32,

    /// Port exposed by the service
    #[arg(long, env = "SHIPYARD_PORT", default_value = "80")]
    port: u16,

    /// Port the inference service listens on in the container
    #[arg(long, env = "SHIPYARD_CONTAINER_PORT", default_value = "5000")]
    container_port: u16,

    /// Deployment template with ${NAME} placeholders
    #[arg(long, env = "SHIPYARD_TEMPLATE")]
    template: Option<PathBuf>,

    /// Maximum wait for readiness, in seconds
    #[arg(long, env = "SHIPYARD_READINESS_TIMEOUT", default_value = "300")]
    readiness_timeout: u64,

    /// Readiness polling interval, in seconds
    #[arg(long, env = "SHIPYARD_POLL_INTERVAL", default_value = "5")]
    poll_interval: u64,

    /// JSON file with the smoke test payload
    #[arg(long, env = "SHIPYARD_PAYLOAD")]
    payload: Option<PathBuf>,

    /// Smoke test request timeout, in seconds
    #[arg(long, env = "SHIPYARD_VERIFY_TIMEOUT", default_value = "30")]
    verify_timeout: u64,

    /// Container engine binary
    #[arg(long, env = "SHIPYARD_ENGINE", default_value = "podman")]
    engine: String,

    /// Registry inspection binary used to confirm pushed digests
    #[arg(long, env = "SHIPYARD_SKOPEO", default_value = "skopeo")]
    skopeo: String,

    /// kubectl binary
    #[arg(long, env = "SHIPYARD_KUBECTL", default_value = "kubectl")]
    kubectl: String,

    /// Print the run record as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

impl DeployArgs {
    /// Converts the arguments into a validated runner configuration
    fn into_config(self) -> Result<RunnerConfig> {
        let credentials = match (self.registry_username, self.registry_password) {
            (Some(username), Some(password)) => Some(RegistryCredentials { username, password }),
            (None, None) => None,
            _ => anyhow::bail!("registry username and password must be given together"),
        };

        let mut config = RunnerConfig::new(
            self.artifact_repo,
            self.build_context,
            self.service_name,
            self.registry,
        );
        config.api_version = self.api_version;
        config.params = self.params.into_iter().collect();
        config.channel = self.channel;
        config.credentials = credentials;
        config.push_retries = self.push_retries;
        config.push_backoff = Duration::from_millis(self.push_backoff_ms);
        config.namespace = self.namespace;
        config.replicas = self.replicas;
        config.port = self.port;
        config.container_port = self.container_port;
        config.template = self.template;
        config.readiness_timeout = Duration::from_secs(self.readiness_timeout);
        config.poll_interval = Duration::from_secs(self.poll_interval);
        config.payload = self.payload;
        config.verify_timeout = Duration::from_secs(self.verify_timeout);

        config.validate().context("Invalid deployment configuration")?;
        Ok(config)
    }
}

/// Run the pipeline once and report the outcome
pub async fn handle_deploy(args: DeployArgs) -> Result<ExitCode> {
    let json = args.json;
    let engine = Arc::new(
        PodmanEngine::new(args.engine.clone()).with_inspector(args.skopeo.clone()),
    );
    let cluster = Arc::new(KubectlOrchestrator::new(args.kubectl.clone()));
    let config = args.into_config()?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(handle_interrupts(tokio::signal::ctrl_c, on_interrupt, || {
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }));

    let run = Pipeline::new(config, engine, cluster)
        .with_cancel_flag(cancel)
        .run()
        .await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run).context("Failed to serialize run")?
        );
    } else {
        print_run_summary(&run);
    }

    if let Some(failure) = run.failure() {
        print_failure(failure);
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// Cancels the run on the first interrupt and calls `abort` on the second
///
/// Cancellation only takes effect between stages, so a second interrupt is
/// the way out of a long stage such as the readiness wait.
async fn handle_interrupts<F, Fut>(mut interrupt: F, cancel: CancelFlag, abort: impl FnOnce())
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return;
    }
    warn!("Interrupt received, stopping after the current stage (Ctrl-C again to abort)");
    cancel.cancel();

    if interrupt().await.is_ok() {
        warn!("Second interrupt received, aborting");
        abort();
    }
}

fn print_run_summary(run: &PipelineRun) {
    println!("{}", "Deployment Run:".bold());
    println!("  ID:       {}", run.id.to_string().cyan());
    println!("  Status:   {}", colorize_status(&run.status));
    println!(
        "  Started:  {}",
        run.started_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(finished) = run.finished_at {
        let duration = finished.signed_duration_since(run.started_at);
        println!("  Duration: {}s", duration.num_seconds());
    }

    println!("\n{}", "Stages:".bold());
    for result in run.stages() {
        let marker = if result.success {
            "✓".green()
        } else {
            "✗".red()
        };
        let elapsed = result
            .finished_at
            .signed_duration_since(result.started_at)
            .num_milliseconds();

        println!(
            "  {} {:<12} {:>7}ms  {}",
            marker,
            result.stage.as_str(),
            elapsed,
            first_line(&result.diagnostic).dimmed()
        );
    }
}

fn print_failure(failure: &StageResult) {
    let kind = failure
        .error_kind
        .map(|k| k.as_str())
        .unwrap_or("UnknownError");

    eprintln!();
    eprintln!(
        "{} stage '{}' failed with {}",
        "error:".red().bold(),
        failure.stage,
        kind.red()
    );
    eprintln!("{}", failure.diagnostic);
}

fn colorize_status(status: &RunStatus) -> ColoredString {
    match status {
        RunStatus::Running { stage } => format!("running ({})", stage).yellow(),
        RunStatus::Succeeded => "succeeded".green(),
        RunStatus::Failed { stage } => format!("failed ({})", stage).red(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

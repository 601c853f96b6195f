//! End-to-end pipeline scenarios against in-process fakes and a mocked
//! inference endpoint.

mod common;

use common::{FakeCluster, FakeEngine, artifact_repo, build_context};
use serde_json::json;
use shipyard_core::domain::deployment::ServiceEndpoint;
use shipyard_core::domain::run::{PipelineRun, RunStatus, Stage};
use shipyard_core::{ErrorKind, StageError};
use shipyard_runner::{CancelFlag, Pipeline, RunnerConfig, ToolError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    repo: tempfile::TempDir,
    context: tempfile::TempDir,
    server: MockServer,
}

impl Fixture {
    /// Repository with two artifacts and an endpoint answering `response`
    async fn new(response: ResponseTemplate, expected_calls: u64) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/titanic/v1/predict"))
            .respond_with(response)
            .expect(expected_calls)
            .mount(&server)
            .await;

        Self {
            repo: artifact_repo(&[
                ("model-20240101T000000.pkl", "weights-january"),
                ("model-20240301T000000.pkl", "weights-march"),
            ]),
            context: build_context(),
            server,
        }
    }

    fn config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::new(
            self.repo.path(),
            self.context.path(),
            "titanic",
            "registry.local:5000",
        )
        .with_param("WORKERS", "2");
        config.namespace = "ml".to_string();
        config.poll_interval = Duration::from_millis(5);
        config.readiness_timeout = Duration::from_millis(100);
        config.push_backoff = Duration::from_millis(1);
        config.verify_timeout = Duration::from_secs(5);
        config
    }

    fn endpoint(&self) -> ServiceEndpoint {
        let address = self.server.address();
        ServiceEndpoint::new(address.ip().to_string(), address.port())
    }

    fn cluster(&self) -> Arc<FakeCluster> {
        Arc::new(FakeCluster::with_endpoint(self.endpoint()))
    }
}

fn ok_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"prediction": [1]}))
}

fn assert_failed_at(run: &PipelineRun, stage: Stage, kind: ErrorKind) {
    assert_eq!(run.status, RunStatus::Failed { stage });
    let failure = run.failure().expect("run has a failed stage");
    assert_eq!(failure.stage, stage);
    assert_eq!(failure.error_kind, Some(kind));

    // Every earlier stage succeeded, nothing later was recorded
    let recorded: Vec<Stage> = run.stages().iter().map(|r| r.stage).collect();
    assert_eq!(recorded, Stage::ALL[..stage.position()].to_vec());
    assert!(run.stages()[..stage.position() - 1].iter().all(|r| r.success));
}

#[tokio::test]
async fn test_successful_run() {
    let fixture = Fixture::new(ok_response(), 1).await;
    let engine = Arc::new(FakeEngine::default());
    let cluster = fixture.cluster();

    let run = Pipeline::new(fixture.config(), engine.clone(), cluster.clone())
        .run()
        .await;

    assert!(run.succeeded(), "run failed: {:?}", run.failure());
    assert!(run.finished_at.is_some());
    let recorded: Vec<Stage> = run.stages().iter().map(|r| r.stage).collect();
    assert_eq!(recorded, Stage::ALL.to_vec());

    // Latest artifact was baked into the image
    assert_eq!(
        *engine.built_artifacts.lock().unwrap(),
        vec!["weights-march".to_string()]
    );
    assert_eq!(
        std::fs::read_to_string(fixture.context.path().join(".env")).unwrap(),
        "API_VERSION=1\nSERVICE_NAME=titanic\nWORKERS=2\n"
    );
    assert_eq!(engine.calls(), vec!["build", "prune", "push", "registry_digest"]);

    // Deployment runs the digest-pinned image
    let deployment = cluster.get("Deployment", "ml", "titanic").unwrap();
    let image = deployment["spec"]["template"]["spec"]["containers"][0]["image"]
        .as_str()
        .unwrap();
    assert!(image.starts_with("registry.local:5000/titanic@sha256:"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let fixture = Fixture::new(ok_response(), 2).await;
    let engine = Arc::new(FakeEngine::default());
    let cluster = fixture.cluster();
    let pipeline = Pipeline::new(fixture.config(), engine.clone(), cluster.clone());

    let first = pipeline.run().await;
    let image_after_first = cluster.get("Deployment", "ml", "titanic").unwrap();
    let second = pipeline.run().await;
    let image_after_second = cluster.get("Deployment", "ml", "titanic").unwrap();

    assert!(first.succeeded());
    assert!(second.succeeded());
    assert_ne!(first.id, second.id);
    assert_eq!(image_after_first, image_after_second);
    assert_eq!(cluster.count("Deployment"), 1);
    assert_eq!(cluster.count("Service"), 1);
}

#[tokio::test]
async fn test_empty_repository_halts_at_selecting() {
    let fixture = Fixture::new(ok_response(), 0).await;
    let empty = artifact_repo(&[]);
    let engine = Arc::new(FakeEngine::default());
    let cluster = fixture.cluster();

    let mut config = fixture.config();
    config.artifact_repo = empty.path().to_path_buf();

    let run = Pipeline::new(config, engine.clone(), cluster.clone())
        .run()
        .await;

    assert_failed_at(&run, Stage::Selecting, ErrorKind::NotFound);
    assert!(!fixture.context.path().join(".env").exists());
    assert!(engine.calls().is_empty());
    assert_eq!(cluster.applies.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_toolchain_halts_at_building() {
    let fixture = Fixture::new(ok_response(), 0).await;
    let engine = Arc::new(FakeEngine {
        unavailable: true,
        ..Default::default()
    });
    let cluster = fixture.cluster();

    let run = Pipeline::new(fixture.config(), engine.clone(), cluster.clone())
        .run()
        .await;

    assert_failed_at(&run, Stage::Building, ErrorKind::Build);
    let failure = run.failure().unwrap();
    assert!(failure.diagnostic.contains("No such file or directory"));
    assert_eq!(engine.calls(), vec!["build"]);
    assert_eq!(cluster.applies.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_publish_failure_halts_before_deploying() {
    let fixture = Fixture::new(ok_response(), 0).await;
    let engine = Arc::new(FakeEngine::default());
    engine
        .push_failures
        .lock()
        .unwrap()
        .push_back(common::failed("Error: denied: requested access to the resource is denied"));
    let cluster = fixture.cluster();

    let run = Pipeline::new(fixture.config(), engine.clone(), cluster.clone())
        .run()
        .await;

    assert_failed_at(&run, Stage::Publishing, ErrorKind::Publish);
    assert_eq!(cluster.applies.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_readiness_timeout_halts_at_deploying() {
    let fixture = Fixture::new(ok_response(), 0).await;
    let engine = Arc::new(FakeEngine::default());
    let cluster = Arc::new(FakeCluster {
        never_ready: true,
        ..FakeCluster::with_endpoint(fixture.endpoint())
    });

    let run = Pipeline::new(fixture.config(), engine.clone(), cluster.clone())
        .run()
        .await;

    assert_failed_at(&run, Stage::Deploying, ErrorKind::ReadinessTimeout);
    // Left in place for inspection
    assert_eq!(cluster.count("Deployment"), 1);
    // The mock server verifies on drop that the endpoint was never called
}

#[tokio::test]
async fn test_rejected_deployment_halts_at_deploying() {
    let fixture = Fixture::new(ok_response(), 0).await;
    let engine = Arc::new(FakeEngine::default());
    let cluster = Arc::new(FakeCluster {
        reject: Some("The Deployment \"titanic\" is invalid: spec.replicas".to_string()),
        ..Default::default()
    });

    let run = Pipeline::new(fixture.config(), engine.clone(), cluster.clone())
        .run()
        .await;

    assert_failed_at(&run, Stage::Deploying, ErrorKind::Deployment);
    assert!(run.failure().unwrap().diagnostic.contains("is invalid"));
}

#[tokio::test]
async fn test_bad_response_halts_at_verifying() {
    let fixture = Fixture::new(
        ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})),
        1,
    )
    .await;
    let engine = Arc::new(FakeEngine::default());
    let cluster = fixture.cluster();

    let run = Pipeline::new(fixture.config(), engine.clone(), cluster.clone())
        .run()
        .await;

    assert_failed_at(&run, Stage::Verifying, ErrorKind::Verification);
    assert!(run.failure().unwrap().diagnostic.contains("prediction"));
}

#[tokio::test]
async fn test_custom_payload_file() {
    let fixture = Fixture::new(ok_response(), 1).await;
    let payload = fixture.context.path().join("payload.json");
    std::fs::write(&payload, r#"{"Pclass": [3], "Sex": ["female"]}"#).unwrap();

    let mut config = fixture.config();
    config.payload = Some(payload);

    let run = Pipeline::new(config, Arc::new(FakeEngine::default()), fixture.cluster())
        .run()
        .await;

    assert!(run.succeeded(), "run failed: {:?}", run.failure());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fixture = Fixture::new(ok_response(), 0).await;
    let engine = Arc::new(FakeEngine::default());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let run = Pipeline::new(fixture.config(), engine.clone(), fixture.cluster())
        .with_cancel_flag(cancel)
        .run()
        .await;

    assert_failed_at(&run, Stage::Selecting, ErrorKind::Cancelled);
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_lets_current_stage_finish() {
    let fixture = Fixture::new(ok_response(), 0).await;
    let cancel = CancelFlag::new();
    let engine = Arc::new(FakeEngine {
        cancel_on_build: Some(cancel.clone()),
        ..Default::default()
    });
    let cluster = fixture.cluster();

    let run = Pipeline::new(fixture.config(), engine.clone(), cluster.clone())
        .with_cancel_flag(cancel)
        .run()
        .await;

    // Build completed, publishing never started
    assert_failed_at(&run, Stage::Publishing, ErrorKind::Cancelled);
    assert!(run.stages()[2].success);
    assert_eq!(engine.count("push"), 0);
}

#[test]
fn test_stage_error_kinds_are_stable() {
    let error = StageError::Build(
        ToolError::Launch {
            program: "podman".into(),
            message: "not found".into(),
        }
        .diagnostic(),
    );
    assert_eq!(error.kind().as_str(), "BuildError");
}

//! In-process stand-ins for the container engine and the cluster.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use shipyard_core::domain::deployment::ServiceEndpoint;
use shipyard_runner::{
    CancelFlag, ClusterOrchestrator, ContainerEngine, DeploymentStatus, RegistryCredentials,
    ToolError,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

fn hash_hex(parts: &[&str]) -> String {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn failed(stderr: &str) -> ToolError {
    ToolError::Failed {
        program: "podman".to_string(),
        exit_code: 125,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Container engine keeping images in memory
///
/// Image ids and digests are derived from the artifact baked into the image,
/// so identical inputs give identical images.
#[derive(Default)]
pub struct FakeEngine {
    pub calls: Mutex<Vec<String>>,
    /// Behave as if the engine binary is missing
    pub unavailable: bool,
    pub build_failure: Option<ToolError>,
    pub prune_fails: bool,
    pub login_failure: Option<ToolError>,
    /// Returned by successive pushes before one succeeds
    pub push_failures: Mutex<VecDeque<ToolError>>,
    /// Replaces the digest the registry serves for every tag
    pub served_digest: Option<String>,
    /// Digests of pushed tags, as held by the registry
    pub registry: Mutex<HashMap<String, String>>,
    /// Set during `build`, to cancel mid-run
    pub cancel_on_build: Option<CancelFlag>,
    pub images: Mutex<HashMap<String, String>>,
    /// Artifact contents seen by each build
    pub built_artifacts: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: &str) -> Result<(), ToolError> {
        self.calls.lock().unwrap().push(call.to_string());
        if self.unavailable {
            return Err(ToolError::Launch {
                program: "podman".to_string(),
                message: "No such file or directory (os error 2)".to_string(),
            });
        }
        Ok(())
    }

    fn digest_for(&self, reference: &str) -> Option<String> {
        let images = self.images.lock().unwrap();
        images
            .get(reference)
            .map(|id| format!("sha256:{}", hash_hex(&[reference, id])))
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build(&self, context: &Path, tag: &str) -> Result<String, ToolError> {
        self.record("build")?;
        if let Some(e) = &self.build_failure {
            return Err(e.clone());
        }

        let artifact = std::fs::read_to_string(context.join("model/model.pkl")).map_err(|e| {
            failed(&format!("COPY model/model.pkl: {}", e))
        })?;
        let config = std::fs::read_to_string(context.join(".env")).unwrap_or_default();
        self.built_artifacts.lock().unwrap().push(artifact.clone());

        let id = hash_hex(&[&artifact, &config]);
        self.images.lock().unwrap().insert(tag.to_string(), id.clone());

        if let Some(flag) = &self.cancel_on_build {
            flag.cancel();
        }
        Ok(id)
    }

    async fn prune_dangling(&self) -> Result<(), ToolError> {
        self.record("prune")?;
        if self.prune_fails {
            return Err(failed("Error: image store is locked"));
        }
        Ok(())
    }

    async fn login(
        &self,
        _registry: &str,
        _credentials: &RegistryCredentials,
    ) -> Result<(), ToolError> {
        self.record("login")?;
        match &self.login_failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn push(&self, reference: &str) -> Result<String, ToolError> {
        self.record("push")?;
        if let Some(e) = self.push_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        let digest = self
            .digest_for(reference)
            .ok_or_else(|| failed(&format!("Error: {}: image not known", reference)))?;
        self.registry
            .lock()
            .unwrap()
            .insert(reference.to_string(), digest.clone());
        Ok(digest)
    }

    async fn registry_digest(&self, reference: &str) -> Result<String, ToolError> {
        self.record("registry_digest")?;
        if let Some(digest) = &self.served_digest {
            return Ok(digest.clone());
        }
        self.registry
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| ToolError::Failed {
                program: "skopeo".to_string(),
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("manifest unknown: {}", reference),
            })
    }
}

/// Cluster keeping applied resources in memory, keyed by (kind, namespace, name)
#[derive(Default)]
pub struct FakeCluster {
    pub resources: Mutex<BTreeMap<(String, String, String), JsonValue>>,
    pub applies: AtomicU32,
    pub status_polls: AtomicU32,
    /// Deployments never report ready replicas
    pub never_ready: bool,
    /// Status polls answered with a rollout in progress: the new pods are
    /// surged in but unavailable while an old pod still reports ready
    pub rollout_polls: u32,
    /// Rejects every apply with this message
    pub reject: Option<String>,
    pub endpoint: Option<ServiceEndpoint>,
}

impl FakeCluster {
    pub fn with_endpoint(endpoint: ServiceEndpoint) -> Self {
        Self {
            endpoint: Some(endpoint),
            ..Default::default()
        }
    }

    pub fn count(&self, kind: &str) -> usize {
        self.resources
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _, _)| k == kind)
            .count()
    }

    pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Option<JsonValue> {
        self.resources
            .lock()
            .unwrap()
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ClusterOrchestrator for FakeCluster {
    async fn apply(&self, manifest: &str) -> Result<(), ToolError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.reject {
            return Err(ToolError::Failed {
                program: "kubectl".to_string(),
                exit_code: 1,
                stdout: String::new(),
                stderr: reason.clone(),
            });
        }

        let manifest: JsonValue = serde_json::from_str(manifest).map_err(|e| ToolError::Failed {
            program: "kubectl".to_string(),
            exit_code: 1,
            stdout: String::new(),
            stderr: format!("error: error parsing manifest: {}", e),
        })?;

        let items = match manifest["kind"].as_str() {
            Some("List") => manifest["items"].as_array().cloned().unwrap_or_default(),
            _ => vec![manifest],
        };

        let mut resources = self.resources.lock().unwrap();
        for item in items {
            let key = (
                item["kind"].as_str().unwrap_or_default().to_string(),
                item["metadata"]["namespace"]
                    .as_str()
                    .unwrap_or("default")
                    .to_string(),
                item["metadata"]["name"].as_str().unwrap_or_default().to_string(),
            );
            resources.insert(key, item);
        }
        Ok(())
    }

    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentStatus>, ToolError> {
        let poll = self.status_polls.fetch_add(1, Ordering::SeqCst);
        let Some(deployment) = self.get("Deployment", namespace, name) else {
            return Ok(None);
        };

        let desired = deployment["spec"]["replicas"].as_u64().unwrap_or(1) as u32;
        if poll < self.rollout_polls {
            return Ok(Some(DeploymentStatus {
                desired,
                total: desired + 1,
                ready: desired,
                available: desired,
                updated: desired,
                generation: 2,
                observed_generation: 2,
            }));
        }

        let ready = if self.never_ready { 0 } else { desired };
        Ok(Some(DeploymentStatus {
            desired,
            total: desired,
            ready,
            available: ready,
            updated: ready,
            generation: 1,
            observed_generation: 1,
        }))
    }

    async fn service_endpoint(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceEndpoint>, ToolError> {
        if self.get("Service", namespace, name).is_none() {
            return Ok(None);
        }
        Ok(self.endpoint.clone())
    }
}

/// Artifact repository with the given `(file name, contents)` entries
pub fn artifact_repo(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

/// Build context holding a minimal service source tree
pub fn build_context() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Containerfile"),
        "FROM python:3.11-slim\nCOPY . /app\nEXPOSE 5000\nCMD [\"python\", \"/app/app.py\"]\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("app.py"), "# inference service\n").unwrap();
    dir
}

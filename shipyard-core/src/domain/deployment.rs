//! Deployment domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::image::ImageReference;

/// Parameters a deployment template is rendered with
///
/// At most one deployment exists per (`service_name`, `namespace`);
/// submitting the same pair again updates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub service_name: String,
    pub namespace: String,
    pub replicas: u32,
    /// Port exposed by the load-balanced service
    pub port: u16,
    /// Port the inference service listens on inside the container
    pub container_port: u16,
    pub image: ImageReference,
}

/// Network address of a deployment with at least one ready replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base HTTP URL, bracketing IPv6 literals
    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

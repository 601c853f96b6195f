//! Deployment templates
//!
//! A template is manifest text with `${NAME}` placeholders. Rendering
//! substitutes the deployment parameters; anything left unresolved makes the
//! template malformed.

use shipyard_core::StageError;
use shipyard_core::domain::deployment::DeploymentDescriptor;
use std::path::Path;

/// Deployment plus load-balanced service, as a kubectl `List`
const BUILTIN_TEMPLATE: &str = r#"{
  "apiVersion": "v1",
  "kind": "List",
  "items": [
    {
      "apiVersion": "apps/v1",
      "kind": "Deployment",
      "metadata": {
        "name": "${SERVICE_NAME}",
        "namespace": "${NAMESPACE}",
        "labels": {"app": "${SERVICE_NAME}", "app.kubernetes.io/managed-by": "shipyard"}
      },
      "spec": {
        "replicas": ${REPLICAS},
        "selector": {"matchLabels": {"app": "${SERVICE_NAME}"}},
        "strategy": {"type": "RollingUpdate"},
        "template": {
          "metadata": {"labels": {"app": "${SERVICE_NAME}"}},
          "spec": {
            "containers": [
              {
                "name": "${SERVICE_NAME}",
                "image": "${IMAGE}",
                "ports": [{"containerPort": ${CONTAINER_PORT}}],
                "readinessProbe": {
                  "tcpSocket": {"port": ${CONTAINER_PORT}},
                  "periodSeconds": 5
                }
              }
            ]
          }
        }
      }
    },
    {
      "apiVersion": "v1",
      "kind": "Service",
      "metadata": {
        "name": "${SERVICE_NAME}",
        "namespace": "${NAMESPACE}",
        "labels": {"app": "${SERVICE_NAME}", "app.kubernetes.io/managed-by": "shipyard"}
      },
      "spec": {
        "type": "LoadBalancer",
        "selector": {"app": "${SERVICE_NAME}"},
        "ports": [{"port": ${PORT}, "targetPort": ${CONTAINER_PORT}}]
      }
    }
  ]
}
"#;

/// Parameterized deployment request
#[derive(Debug, Clone)]
pub struct DeploymentTemplate {
    source: String,
}

impl DeploymentTemplate {
    pub fn builtin() -> Self {
        Self::from_source(BUILTIN_TEMPLATE)
    }

    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Loads `path`, or the built-in template when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, StageError> {
        match path {
            None => Ok(Self::builtin()),
            Some(path) => std::fs::read_to_string(path)
                .map(Self::from_source)
                .map_err(|e| {
                    StageError::Deployment(format!(
                        "cannot read deployment template {}: {}",
                        path.display(),
                        e
                    ))
                }),
        }
    }

    /// Substitutes the descriptor into the template
    ///
    /// The image is always referenced by digest when one is known, so an
    /// update is rolled out even when the tag did not change.
    pub fn render(&self, descriptor: &DeploymentDescriptor) -> Result<String, StageError> {
        let values = [
            ("SERVICE_NAME", descriptor.service_name.clone()),
            ("NAMESPACE", descriptor.namespace.clone()),
            ("IMAGE", descriptor.image.pinned()),
            ("REPLICAS", descriptor.replicas.to_string()),
            ("PORT", descriptor.port.to_string()),
            ("CONTAINER_PORT", descriptor.container_port.to_string()),
        ];

        let mut rendered = self.source.clone();
        for (name, value) in &values {
            rendered = rendered.replace(&format!("${{{}}}", name), value);
        }

        if let Some(start) = rendered.find("${") {
            let placeholder: String = rendered[start..]
                .chars()
                .take_while(|c| *c != '}')
                .chain(std::iter::once('}'))
                .collect();
            return Err(StageError::Deployment(format!(
                "template has unresolved placeholder {}",
                placeholder
            )));
        }

        if rendered.trim_start().starts_with('{') {
            serde_json::from_str::<serde_json::Value>(&rendered).map_err(|e| {
                StageError::Deployment(format!("rendered template is not valid JSON: {}", e))
            })?;
        }

        Ok(rendered)
    }
}

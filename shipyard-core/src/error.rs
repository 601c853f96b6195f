//! Stage error taxonomy
//!
//! Every stage fails with exactly one of these kinds. The payload is the
//! underlying tool's diagnostic output, carried verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by pipeline stages
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Artifact repository missing, unreadable, or empty
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// Configuration bundle could not be materialized
    #[error("failed to write configuration: {0}")]
    ConfigWrite(String),

    /// Image build failed
    #[error("image build failed: {0}")]
    Build(String),

    /// Registry push failed
    #[error("image publish failed: {message}")]
    Publish {
        message: String,
        /// Whether the failure was transient (network) rather than terminal
        retryable: bool,
    },

    /// Deployment request was malformed or rejected
    #[error("deployment rejected: {0}")]
    Deployment(String),

    /// Deployment was accepted but never became ready
    #[error("deployment not ready after {waited_secs}s: {message}")]
    ReadinessTimeout { waited_secs: u64, message: String },

    /// Smoke test against the deployed endpoint failed
    #[error("verification failed: {0}")]
    Verification(String),

    /// Run was cancelled at a stage boundary
    #[error("run cancelled: {0}")]
    Cancelled(String),
}

impl StageError {
    pub fn publish(message: impl Into<String>, retryable: bool) -> Self {
        Self::Publish {
            message: message.into(),
            retryable,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ConfigWrite(_) => ErrorKind::ConfigWrite,
            Self::Build(_) => ErrorKind::Build,
            Self::Publish { .. } => ErrorKind::Publish,
            Self::Deployment(_) => ErrorKind::Deployment,
            Self::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            Self::Verification(_) => ErrorKind::Verification,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Raw diagnostic without the kind prefix
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::ConfigWrite(msg)
            | Self::Build(msg)
            | Self::Deployment(msg)
            | Self::Verification(msg)
            | Self::Cancelled(msg) => msg,
            Self::Publish { message, .. } | Self::ReadinessTimeout { message, .. } => message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Publish { retryable: true, .. })
    }
}

/// Stable name of a stage error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "NotFoundError")]
    NotFound,
    #[serde(rename = "ConfigWriteError")]
    ConfigWrite,
    #[serde(rename = "BuildError")]
    Build,
    #[serde(rename = "PublishError")]
    Publish,
    #[serde(rename = "DeploymentError")]
    Deployment,
    #[serde(rename = "ReadinessTimeoutError")]
    ReadinessTimeout,
    #[serde(rename = "VerificationError")]
    Verification,
    #[serde(rename = "CancelledError")]
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFoundError",
            Self::ConfigWrite => "ConfigWriteError",
            Self::Build => "BuildError",
            Self::Publish => "PublishError",
            Self::Deployment => "DeploymentError",
            Self::ReadinessTimeout => "ReadinessTimeoutError",
            Self::Verification => "VerificationError",
            Self::Cancelled => "CancelledError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

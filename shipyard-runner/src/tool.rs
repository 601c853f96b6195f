//! External tool invocation
//!
//! Runs a control-plane tool (podman, kubectl) to completion and turns its exit
//! status into a typed result. stdout/stderr are always logged at debug level
//! and kept verbatim for diagnostics.

use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Markers of failures worth retrying (network hiccups, overloaded registry)
const TRANSIENT_MARKERS: &[&str] = &[
    "connection reset",
    "connection refused",
    "broken pipe",
    "i/o timeout",
    "timed out",
    "timeout",
    "temporary failure",
    "temporarily unavailable",
    "tls handshake",
    "unexpected eof",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
    "too many requests",
];

/// Errors from running an external tool
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The tool could not be started (not installed, not executable)
    #[error("failed to execute '{program}': {message}")]
    Launch { program: String, message: String },

    /// The tool ran and exited non-zero
    #[error("'{program}' exited with code {exit_code}: {stderr}")]
    Failed {
        program: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The tool succeeded but its output could not be understood
    #[error("unexpected output from '{program}': {message}")]
    Output { program: String, message: String },
}

impl ToolError {
    /// Full diagnostic text, including stdout for failed runs
    ///
    /// Build tools report failing steps on stdout, so both streams are kept.
    pub fn diagnostic(&self) -> String {
        match self {
            ToolError::Failed {
                program,
                exit_code,
                stdout,
                stderr,
            } => {
                let mut out = format!("'{}' exited with code {}", program, exit_code);
                if !stdout.trim().is_empty() {
                    out.push_str("\n--- stdout ---\n");
                    out.push_str(stdout.trim_end());
                }
                if !stderr.trim().is_empty() {
                    out.push_str("\n--- stderr ---\n");
                    out.push_str(stderr.trim_end());
                }
                out
            }
            other => other.to_string(),
        }
    }

    /// Whether retrying the same invocation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ToolError::Failed { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m))
            }
            ToolError::Launch { .. } | ToolError::Output { .. } => false,
        }
    }
}

/// Captured output of a successful tool run
#[derive(Debug, Clone)]
pub(crate) struct ToolOutput {
    pub stdout: String,
}

/// Runs `program args...`, optionally feeding `stdin`, and waits for exit
pub(crate) async fn run(
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<ToolOutput, ToolError> {
    debug!("Running {} {:?}", program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let launch_error = |e: std::io::Error| ToolError::Launch {
        program: program.to_string(),
        message: e.to_string(),
    };

    let mut child = command.spawn().map_err(launch_error)?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        match pipe.write_all(input).await {
            Ok(()) => {}
            // The tool exited without reading all of its input; its exit
            // status and stderr below tell why
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("{} closed stdin early: {}", program, e);
            }
            Err(e) => return Err(launch_error(e)),
        }
        // Closing stdin signals end of input
        drop(pipe);
    }

    let output = child.wait_with_output().await.map_err(launch_error)?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    // Always log stdout/stderr as debug
    if !stdout.trim().is_empty() {
        debug!("{} stdout: {}", program, stdout.trim());
    }
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", program, stderr.trim());
    }

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        });
    }

    Ok(ToolOutput { stdout })
}

//! Pipeline run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ErrorKind, StageError};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Selecting,
    Configuring,
    Building,
    Publishing,
    Deploying,
    Verifying,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Selecting,
        Stage::Configuring,
        Stage::Building,
        Stage::Publishing,
        Stage::Deploying,
        Stage::Verifying,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Selecting => "selecting",
            Stage::Configuring => "configuring",
            Stage::Building => "building",
            Stage::Publishing => "publishing",
            Stage::Deploying => "deploying",
            Stage::Verifying => "verifying",
        }
    }

    /// One-based position in the pipeline
    pub fn position(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or_default() + 1
    }

    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.position()).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunStatus {
    /// The given stage is next to run or running
    Running { stage: Stage },
    Succeeded,
    /// The given stage failed; nothing after it ran
    Failed { stage: Stage },
}

/// Outcome of a single stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    /// Stage summary on success, verbatim tool diagnostic on failure
    pub diagnostic: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Aggregate record of one end-to-end run
///
/// Results can only be appended for the current stage, so they are always in
/// pipeline order. Once the run is terminal further records are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    stages: Vec<StageResult>,
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running {
                stage: Stage::Selecting,
            },
            stages: Vec::new(),
        }
    }

    /// Stage that runs next, or `None` once the run is terminal
    pub fn current_stage(&self) -> Option<Stage> {
        match self.status {
            RunStatus::Running { stage } => Some(stage),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage().is_none()
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    /// The failed stage's result, if the run failed
    pub fn failure(&self) -> Option<&StageResult> {
        self.stages.iter().find(|result| !result.success)
    }

    /// Records success of the current stage and advances to the next one
    pub fn record_success(&mut self, started_at: DateTime<Utc>, summary: impl Into<String>) {
        let Some(stage) = self.current_stage() else {
            return;
        };

        let finished_at = Utc::now();
        self.stages.push(StageResult {
            stage,
            success: true,
            error_kind: None,
            diagnostic: summary.into(),
            started_at,
            finished_at,
        });

        self.status = match stage.next() {
            Some(next) => RunStatus::Running { stage: next },
            None => {
                self.finished_at = Some(finished_at);
                RunStatus::Succeeded
            }
        };
    }

    /// Records failure of the current stage and terminates the run
    pub fn record_failure(&mut self, started_at: DateTime<Utc>, error: &StageError) {
        let Some(stage) = self.current_stage() else {
            return;
        };

        let finished_at = Utc::now();
        self.stages.push(StageResult {
            stage,
            success: false,
            error_kind: Some(error.kind()),
            diagnostic: error.diagnostic().to_string(),
            started_at,
            finished_at,
        });
        self.finished_at = Some(finished_at);
        self.status = RunStatus::Failed { stage };
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-step outcomes, pipeline state and the aggregated result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CheckError, FailureKind, HarnessError, Result};

/// Result of executing one check step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Name of the step this outcome belongs to.
    pub step_name: String,

    /// Whether the step passed.
    pub passed: bool,

    /// Diagnostic text. Never empty on failure.
    pub detail: String,

    /// Failure classification (absent on pass).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Execution time in milliseconds.
    pub duration_ms: u64,
}

impl CheckOutcome {
    pub fn pass(step_name: impl Into<String>, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.into(),
            passed: true,
            detail: detail.into(),
            failure: None,
            duration_ms,
        }
    }

    pub fn fail(step_name: impl Into<String>, error: &CheckError, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.into(),
            passed: false,
            detail: error.to_string(),
            failure: Some(error.kind()),
            duration_ms,
        }
    }

    /// Outcome with timing stripped, for comparing runs.
    pub fn verdict(&self) -> (&str, bool, &str, Option<FailureKind>) {
        (&self.step_name, self.passed, &self.detail, self.failure)
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    Running,
    Passed,
    Failed,
}

impl PipelineState {
    /// Move to `next`, rejecting anything outside
    /// `NotStarted -> Running -> (Passed | Failed)`.
    pub fn transition(self, next: PipelineState) -> Result<PipelineState> {
        use PipelineState::*;
        match (self, next) {
            (NotStarted, Running) | (Running, Running) | (Running, Passed) | (Running, Failed) => {
                Ok(next)
            }
            _ => Err(HarnessError::InvalidStateTransition {
                current: self.to_string(),
                requested: next.to_string(),
            }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Passed | PipelineState::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::NotStarted => write!(f, "not_started"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Passed => write!(f, "passed"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Unique id of this run.
    pub run_id: String,

    /// Name of the manifest that was run.
    pub pipeline: String,

    /// Digest of the ordered step declarations.
    pub manifest_digest: String,

    /// Number of steps declared.
    pub declared_steps: usize,

    /// Outcomes in execution order; a prefix of the declared steps under fail-fast.
    pub outcomes: Vec<CheckOutcome>,

    /// True iff every declared step ran and passed.
    pub passed: bool,

    /// Terminal state.
    pub state: PipelineState,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Number of outcomes that passed.
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    /// Number of outcomes that failed.
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed).count()
    }

    /// Steps that were declared but never executed.
    pub fn skipped_count(&self) -> usize {
        self.declared_steps.saturating_sub(self.outcomes.len())
    }

    /// First failing outcome, if any.
    pub fn first_failure(&self) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| !o.passed)
    }

    /// Process exit code for this result.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

//! Error taxonomy for fixcheck.
//!
//! [`CheckError`] covers everything a single check can run into. These are
//! never propagated out of the pipeline: each one is converted into a failed
//! [`CheckOutcome`](crate::CheckOutcome) where it occurs. [`HarnessError`]
//! covers the harness itself (manifest loading, state machine misuse) and is
//! propagated to the caller.

use serde::{Deserialize, Serialize};

/// Errors produced while executing one check step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("command exited with code {exit_code}{excerpt}")]
    CommandFailure { exit_code: i32, excerpt: String },

    #[error("command timed out after {timeout_secs}s and was terminated")]
    CommandTimeout { timeout_secs: u64 },

    #[error("failed to launch `{command}`: {reason}")]
    LaunchFailure { command: String, reason: String },

    #[error("{path}: missing required pattern(s): {}", format_missing(.missing))]
    PatternMissing { path: String, missing: Vec<String> },

    #[error("failed to read {path}: {reason}")]
    ReadError { path: String, reason: String },
}

impl CheckError {
    /// Build a `CommandFailure` from the captured streams.
    ///
    /// The excerpt is taken from stderr, falling back to stdout when the
    /// command wrote nothing to stderr.
    pub fn command_failure(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        let source = if stderr.trim().is_empty() {
            stdout
        } else {
            stderr
        };
        let excerpt = excerpt(source);
        let excerpt = if excerpt.is_empty() {
            String::new()
        } else {
            format!(": {excerpt}")
        };
        CheckError::CommandFailure { exit_code, excerpt }
    }

    /// Classification used in serialized outcomes.
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckError::CommandFailure { .. } => FailureKind::CommandFailure,
            CheckError::CommandTimeout { .. } => FailureKind::CommandTimeout,
            CheckError::LaunchFailure { .. } => FailureKind::LaunchFailure,
            CheckError::PatternMissing { .. } => FailureKind::PatternMissing,
            CheckError::ReadError { .. } => FailureKind::ReadError,
        }
    }
}

/// Maximum number of output lines carried into a failure detail.
pub const MAX_EXCERPT_LINES: usize = 20;

fn excerpt(output: &str) -> String {
    output
        .trim()
        .lines()
        .take(MAX_EXCERPT_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_missing(missing: &[String]) -> String {
    missing
        .iter()
        .map(|m| format!("{m:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Serializable tag for a [`CheckError`] variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CommandFailure,
    CommandTimeout,
    LaunchFailure,
    PatternMissing,
    ReadError,
}

/// Errors in the harness itself.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid pipeline state transition: {current} -> {requested}")]
    InvalidStateTransition { current: String, requested: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

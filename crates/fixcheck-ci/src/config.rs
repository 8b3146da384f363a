//! Harness configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory checked when none is configured.
pub const DEFAULT_TARGET_DIR: &str = "flutter_app";

/// Per-command timeout when neither the manifest nor the caller sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What the pipeline does after a failing step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    FailFast,

    /// Run every step and report all failures.
    CollectAll,
}

/// Explicit configuration for one harness run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Root that relative step paths and working directories resolve against.
    pub target_dir: PathBuf,

    /// Timeout for command steps without their own override.
    pub timeout: Duration,

    pub failure_policy: FailurePolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from(DEFAULT_TARGET_DIR),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

impl HarnessConfig {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Resolve a step path against the target directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.target_dir.join(path)
    }
}

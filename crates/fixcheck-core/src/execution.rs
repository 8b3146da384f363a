//! External process request and result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Exit code reported when the command was killed (timeout or signal).
pub const KILLED_EXIT_CODE: i32 = -1;

/// Exit code reported when the command could not be started.
pub const LAUNCH_FAILED_EXIT_CODE: i32 = -2;

/// A request to run one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            timeout,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// What happened when a [`CommandRequest`] ran.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandExecution {
    /// Command line that was run.
    pub command: String,

    /// Exit code, or one of the negative sentinels.
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr (holds the launch error when `launched` is false).
    pub stderr: String,

    /// Whether the process was terminated for exceeding its timeout.
    pub timed_out: bool,

    /// Whether the process was started at all.
    pub launched: bool,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// OS process id of the child, when it was started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl CommandExecution {
    /// Result for a command that never started.
    pub fn launch_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_code: LAUNCH_FAILED_EXIT_CODE,
            stdout: String::new(),
            stderr: reason.into(),
            timed_out: false,
            launched: false,
            duration_ms: 0,
            pid: None,
        }
    }

    /// Started, finished within the timeout, and exited 0.
    pub fn succeeded(&self) -> bool {
        self.launched && !self.timed_out && self.exit_code == 0
    }
}

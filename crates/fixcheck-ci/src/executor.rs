//! Step execution: turns a `CheckStep` into a `CheckOutcome`.

use async_trait::async_trait;
use fixcheck_core::{
    CheckError, CheckOutcome, CheckStep, CommandExecution, CommandRequest, CommandStep,
    PatternStep, StepKind, SuccessPolicy,
};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::HarnessConfig;
use crate::pattern::PatternVerifier;
use crate::runner::CommandRunner;

/// Executes a single check step.
///
/// Implementations must not fail: every error in the check taxonomy comes
/// back as a failed outcome.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &CheckStep) -> CheckOutcome;
}

/// Executor that runs commands and reads files on the local machine.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    config: HarnessConfig,
}

impl LocalExecutor {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Build the runner request for a command step.
    pub fn command_request(&self, step: &CommandStep) -> CommandRequest {
        let working_dir = match &step.working_dir {
            Some(dir) => self.config.resolve(dir),
            None => self.config.target_dir.clone(),
        };
        let timeout = step
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.timeout);

        CommandRequest::new(step.command.clone(), timeout).in_dir(working_dir)
    }

    async fn run_command(&self, name: &str, step: &CommandStep) -> CheckOutcome {
        let request = self.command_request(step);
        debug!(step = name, command = %request.command, dir = ?request.working_dir, "Running command step");
        let execution = CommandRunner::execute(&request).await;
        judge_command(name, &execution, &step.success, request.timeout)
    }

    async fn run_patterns(&self, name: &str, step: &PatternStep) -> CheckOutcome {
        let start = Instant::now();
        let path = self.config.resolve(&step.path);
        debug!(step = name, path = %path.display(), patterns = step.patterns.len(), "Running pattern step");

        let result = PatternVerifier::verify(&path, &step.patterns).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(count) => CheckOutcome::pass(
                name,
                format!("all {count} pattern(s) found in {}", path.display()),
                duration_ms,
            ),
            Err(e) => CheckOutcome::fail(name, &e, duration_ms),
        }
    }
}

#[async_trait]
impl StepExecutor for LocalExecutor {
    async fn execute(&self, step: &CheckStep) -> CheckOutcome {
        match &step.kind {
            StepKind::Command(cmd) => self.run_command(&step.name, cmd).await,
            StepKind::ContentPattern(p) => self.run_patterns(&step.name, p).await,
        }
    }
}

/// Judge a finished command against its success policy.
pub fn judge_command(
    step_name: &str,
    execution: &CommandExecution,
    policy: &SuccessPolicy,
    timeout: Duration,
) -> CheckOutcome {
    let duration_ms = execution.duration_ms;

    if !execution.launched {
        let err = CheckError::LaunchFailure {
            command: execution.command.clone(),
            reason: execution.stderr.trim().to_string(),
        };
        return CheckOutcome::fail(step_name, &err, duration_ms);
    }

    if execution.timed_out {
        let err = CheckError::CommandTimeout {
            timeout_secs: timeout.as_secs(),
        };
        return CheckOutcome::fail(step_name, &err, duration_ms);
    }

    if policy.accepts(execution.exit_code, &execution.stderr) {
        let detail = match policy {
            SuccessPolicy::NoErrorMarker { marker } if execution.exit_code != 0 => format!(
                "exit code {} tolerated (no {marker:?} in stderr)",
                execution.exit_code
            ),
            _ => format!("exit code {}", execution.exit_code),
        };
        CheckOutcome::pass(step_name, detail, duration_ms)
    } else {
        let err = CheckError::command_failure(
            execution.exit_code,
            &execution.stdout,
            &execution.stderr,
        );
        CheckOutcome::fail(step_name, &err, duration_ms)
    }
}

//! Check step declarations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named unit of verification.
///
/// Steps are immutable once built; a pipeline only ever borrows them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckStep {
    /// Human-readable label shown in status lines.
    pub name: String,

    /// What this step checks.
    #[serde(flatten)]
    pub kind: StepKind,

    /// Line printed when the step passes (defaults to the step name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_message: Option<String>,
}

/// The two kinds of check a pipeline knows about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Run an external command and require it to succeed.
    Command(CommandStep),

    /// Read a file and require that it contains every pattern.
    ContentPattern(PatternStep),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Command(_) => "command",
            StepKind::ContentPattern(_) => "content_pattern",
        }
    }
}

/// Parameters of a `command` step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandStep {
    /// Shell command line.
    pub command: String,

    /// Working directory; relative paths resolve against the target directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Per-step override of the harness timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// How the exit status is judged.
    #[serde(default)]
    pub success: SuccessPolicy,
}

/// Rule deciding whether a finished command passed.
///
/// Timeouts and launch failures fail under every policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Exit code 0.
    #[default]
    ExitZero,

    /// Exit code 0, or a non-zero exit whose stderr does not mention
    /// `marker` (case-insensitive). Lets analyzers that exit non-zero on
    /// warnings pass.
    NoErrorMarker { marker: String },
}

impl SuccessPolicy {
    /// Judge a completed (not timed out, launched) command.
    pub fn accepts(&self, exit_code: i32, stderr: &str) -> bool {
        match self {
            SuccessPolicy::ExitZero => exit_code == 0,
            SuccessPolicy::NoErrorMarker { marker } => {
                exit_code == 0 || !stderr.to_lowercase().contains(&marker.to_lowercase())
            }
        }
    }
}

/// Parameters of a `content_pattern` step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternStep {
    /// File to scan; relative paths resolve against the target directory.
    pub path: PathBuf,

    /// Substrings that must all be present.
    pub patterns: Vec<RequiredPattern>,
}

/// A required substring together with the guarantee it stands in for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequiredPattern {
    /// Verbatim text to look for.
    pub text: String,

    /// Plain-language guarantee this pattern is a proxy for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guarantee: Option<String>,
}

impl RequiredPattern {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            guarantee: None,
        }
    }

    pub fn proving(mut self, guarantee: impl Into<String>) -> Self {
        self.guarantee = Some(guarantee.into());
        self
    }
}

impl CheckStep {
    /// A command step judged by [`SuccessPolicy::ExitZero`].
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Command(CommandStep {
                command: command.into(),
                working_dir: None,
                timeout_secs: None,
                success: SuccessPolicy::ExitZero,
            }),
            pass_message: None,
        }
    }

    /// A content-pattern step over plain substrings.
    pub fn content_pattern<I, S>(name: impl Into<String>, path: impl Into<PathBuf>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::content_pattern_documented(
            name,
            path,
            patterns.into_iter().map(RequiredPattern::new).collect(),
        )
    }

    /// A content-pattern step whose patterns carry their guarantees.
    pub fn content_pattern_documented(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        patterns: Vec<RequiredPattern>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::ContentPattern(PatternStep {
                path: path.into(),
                patterns,
            }),
            pass_message: None,
        }
    }

    /// Set the line printed on pass.
    pub fn with_pass_message(mut self, message: impl Into<String>) -> Self {
        self.pass_message = Some(message.into());
        self
    }

    /// Set the working directory of a command step. No-op for pattern steps.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        if let StepKind::Command(cmd) = &mut self.kind {
            cmd.working_dir = Some(dir.into());
        }
        self
    }

    /// Override the timeout of a command step. No-op for pattern steps.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        if let StepKind::Command(cmd) = &mut self.kind {
            cmd.timeout_secs = Some(secs);
        }
        self
    }

    /// Set the success policy of a command step. No-op for pattern steps.
    pub fn with_success(mut self, policy: SuccessPolicy) -> Self {
        if let StepKind::Command(cmd) = &mut self.kind {
            cmd.success = policy;
        }
        self
    }

    /// Line shown when this step passes.
    pub fn pass_line(&self) -> &str {
        self.pass_message.as_deref().unwrap_or(&self.name)
    }
}

//! fixcheck CI - verification pipeline
//!
//! Provides a check pipeline that:
//! - Runs the target application's tooling as subprocesses with a timeout
//! - Checks source files for required substrings
//! - Stops at the first failure and reports one verdict

pub mod config;
pub mod executor;
pub mod manifest;
pub mod pattern;
pub mod pipeline;
pub mod reporter;
pub mod runner;

// Re-export key types
pub use config::{FailurePolicy, HarnessConfig, DEFAULT_TARGET_DIR, DEFAULT_TIMEOUT_SECS};
pub use executor::{judge_command, LocalExecutor, StepExecutor};
pub use manifest::{compute_steps_digest, Manifest};
pub use pattern::PatternVerifier;
pub use pipeline::CheckPipeline;
pub use reporter::{ConsoleReporter, JsonReporter, MemoryReporter, ReportEvent, Reporter};
pub use runner::CommandRunner;

//! fixcheck core
//!
//! Data model shared by the check pipeline and the CLI:
//! - `CheckStep`: one declared unit of verification
//! - `CommandRequest` / `CommandExecution`: a subprocess run
//! - `CheckOutcome` / `PipelineResult`: what the pipeline recorded
//! - `CheckError` / `HarnessError`: the error taxonomy

pub mod error;
pub mod execution;
pub mod outcome;
pub mod step;
pub mod telemetry;

pub use error::{CheckError, FailureKind, HarnessError, Result};
pub use execution::{CommandExecution, CommandRequest, KILLED_EXIT_CODE, LAUNCH_FAILED_EXIT_CODE};
pub use outcome::{CheckOutcome, PipelineResult, PipelineState};
pub use step::{CheckStep, CommandStep, PatternStep, RequiredPattern, StepKind, SuccessPolicy};
pub use telemetry::{default_directives, init_tracing};

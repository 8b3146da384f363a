//! Reporting sinks for pipeline progress and verdicts.
//!
//! The pipeline calls a [`Reporter`] once per event. Rendering is best effort:
//! a write error on the report stream is logged and otherwise ignored, so it
//! can never change the verdict or the exit code.

use fixcheck_core::{CheckOutcome, CheckStep, PipelineResult};
use serde::Serialize;
use std::io::Write;
use tracing::warn;

/// Receives pipeline events in order.
pub trait Reporter {
    /// Called once before the first step.
    fn pipeline_started(&mut self, _name: &str, _total_steps: usize) {}

    /// Called before a step executes. `index` is zero-based.
    fn step_started(&mut self, _index: usize, _total_steps: usize, _step: &CheckStep) {}

    /// Called once per executed step.
    fn step_finished(&mut self, step: &CheckStep, outcome: &CheckOutcome);

    /// Called once with the final result. `summary` is empty unless every
    /// step passed.
    fn pipeline_finished(&mut self, result: &PipelineResult, summary: &[String]);
}

const PASS_MARK: &str = "✅";
const FAIL_MARK: &str = "❌";

/// Human-readable report, one status line per step.
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            warn!(error = %e, "Failed to write report line");
        }
    }
}

/// Indent continuation lines of a multi-line detail under its marker.
fn indent_detail(detail: &str) -> String {
    detail.lines().collect::<Vec<_>>().join("\n   ")
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn pipeline_started(&mut self, name: &str, total_steps: usize) {
        self.line(&format!("🧪 Running {name} ({total_steps} check(s))..."));
    }

    fn step_started(&mut self, index: usize, _total_steps: usize, step: &CheckStep) {
        self.line("");
        self.line(&format!("{}. {}...", index + 1, step.name));
    }

    fn step_finished(&mut self, step: &CheckStep, outcome: &CheckOutcome) {
        if outcome.passed {
            self.line(&format!("{PASS_MARK} {}", step.pass_line()));
        } else {
            self.line(&format!(
                "{FAIL_MARK} {}: {}",
                step.name,
                indent_detail(&outcome.detail)
            ));
        }
    }

    fn pipeline_finished(&mut self, result: &PipelineResult, summary: &[String]) {
        self.line("");
        if result.passed {
            self.line(&format!(
                "🎉 {}: all {} check(s) passed!",
                result.pipeline,
                result.outcomes.len()
            ));
            if !summary.is_empty() {
                self.line("");
                self.line("📋 Summary of verified guarantees:");
                for item in summary {
                    self.line(&format!("- {PASS_MARK} {item}"));
                }
            }
        } else {
            let headline = format!(
                "{FAIL_MARK} {} FAILED: {}/{} check(s) passed",
                result.pipeline,
                result.passed_count(),
                result.declared_steps
            );
            match result.first_failure() {
                Some(failure) => self.line(&format!(
                    "{headline}; first failure '{}': {}",
                    failure.step_name,
                    indent_detail(&failure.detail)
                )),
                None => self.line(&headline),
            }
        }
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "Failed to flush report");
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    result: &'a PipelineResult,
    summary: &'a [String],
}

/// Writes the final result as a single JSON document.
pub struct JsonReporter<W: Write> {
    out: W,
}

impl JsonReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn step_finished(&mut self, _step: &CheckStep, _outcome: &CheckOutcome) {}

    fn pipeline_finished(&mut self, result: &PipelineResult, summary: &[String]) {
        let report = JsonReport { result, summary };
        let written = serde_json::to_writer_pretty(&mut self.out, &report)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            warn!(error = %e, "Failed to write JSON report");
        }
    }
}

/// A recorded reporter event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    PipelineStarted { name: String, total_steps: usize },
    StepStarted { index: usize, name: String },
    StepFinished(CheckOutcome),
    PipelineFinished { passed: bool, summary: Vec<String> },
}

/// Reporter that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    pub events: Vec<ReportEvent>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of steps that were started, in order.
    pub fn started_steps(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ReportEvent::StepStarted { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Summary handed over at the end of the run, if the run finished.
    pub fn final_summary(&self) -> Option<&[String]> {
        self.events.iter().rev().find_map(|e| match e {
            ReportEvent::PipelineFinished { summary, .. } => Some(summary.as_slice()),
            _ => None,
        })
    }
}

impl Reporter for MemoryReporter {
    fn pipeline_started(&mut self, name: &str, total_steps: usize) {
        self.events.push(ReportEvent::PipelineStarted {
            name: name.to_string(),
            total_steps,
        });
    }

    fn step_started(&mut self, index: usize, _total_steps: usize, step: &CheckStep) {
        self.events.push(ReportEvent::StepStarted {
            index,
            name: step.name.clone(),
        });
    }

    fn step_finished(&mut self, _step: &CheckStep, outcome: &CheckOutcome) {
        self.events.push(ReportEvent::StepFinished(outcome.clone()));
    }

    fn pipeline_finished(&mut self, result: &PipelineResult, summary: &[String]) {
        self.events.push(ReportEvent::PipelineFinished {
            passed: result.passed,
            summary: summary.to_vec(),
        });
    }
}

//! Check pipeline orchestration.

use chrono::Utc;
use fixcheck_core::{CheckStep, PipelineResult, PipelineState, Result};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FailurePolicy;
use crate::executor::StepExecutor;
use crate::manifest::{compute_steps_digest, Manifest};
use crate::reporter::Reporter;

/// An ordered list of check steps plus the summary shown on success.
#[derive(Debug, Clone)]
pub struct CheckPipeline {
    name: String,
    steps: Vec<CheckStep>,
    summary: Vec<String>,
    failure_policy: FailurePolicy,
    digest: String,
}

impl CheckPipeline {
    pub fn new(name: impl Into<String>, steps: Vec<CheckStep>) -> Self {
        let digest = compute_steps_digest(&steps);
        Self {
            name: name.into(),
            steps,
            summary: Vec::new(),
            failure_policy: FailurePolicy::FailFast,
            digest,
        }
    }

    pub fn from_manifest(manifest: Manifest) -> Self {
        Self::new(manifest.name, manifest.steps).with_summary(manifest.summary)
    }

    pub fn with_summary(mut self, summary: Vec<String>) -> Self {
        self.summary = summary;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[CheckStep] {
        &self.steps
    }

    pub fn summary(&self) -> &[String] {
        &self.summary
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Execute every step in order.
    ///
    /// Each step finishes completely before the next one starts. Under
    /// [`FailurePolicy::FailFast`] the run stops at the first failing
    /// outcome, so `outcomes` may be a strict prefix of the declared steps.
    /// The summary reaches the reporter only when every step passed.
    pub async fn run<E, R>(&self, executor: &E, reporter: &mut R) -> Result<PipelineResult>
    where
        E: StepExecutor + ?Sized,
        R: Reporter + ?Sized,
    {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let total = self.steps.len();
        let mut state = PipelineState::NotStarted;

        info!(run_id = %run_id, pipeline = %self.name, steps = total, "Starting check pipeline");
        reporter.pipeline_started(&self.name, total);

        let mut outcomes = Vec::with_capacity(total);

        for (index, step) in self.steps.iter().enumerate() {
            state = state.transition(PipelineState::Running)?;
            reporter.step_started(index, total, step);
            debug!(step = %step.name, kind = step.kind.label(), "Executing step");

            let outcome = executor.execute(step).await;
            reporter.step_finished(step, &outcome);

            let failed = !outcome.passed;
            if failed {
                warn!(step = %step.name, detail = %outcome.detail, "Step failed");
            } else {
                info!(step = %step.name, duration_ms = outcome.duration_ms, "Step passed");
            }
            outcomes.push(outcome);

            if failed && self.failure_policy == FailurePolicy::FailFast {
                state = state.transition(PipelineState::Failed)?;
                let skipped = total - outcomes.len();
                if skipped > 0 {
                    info!(skipped, "Stopping at first failure");
                }
                break;
            }
        }

        let passed = outcomes.len() == total && outcomes.iter().all(|o| o.passed);

        if !state.is_terminal() {
            if state == PipelineState::NotStarted {
                state = state.transition(PipelineState::Running)?;
            }
            let terminal = if passed {
                PipelineState::Passed
            } else {
                PipelineState::Failed
            };
            state = state.transition(terminal)?;
        }

        let result = PipelineResult {
            run_id,
            pipeline: self.name.clone(),
            manifest_digest: self.digest.clone(),
            declared_steps: total,
            outcomes,
            passed,
            state,
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        let summary: &[String] = if result.passed { &self.summary } else { &[] };
        reporter.pipeline_finished(&result, summary);

        if result.passed {
            info!(run_id = %result.run_id, "Check pipeline passed");
        } else {
            info!(
                run_id = %result.run_id,
                failed = result.failed_count(),
                skipped = result.skipped_count(),
                "Check pipeline failed"
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{MemoryReporter, ReportEvent};
    use async_trait::async_trait;
    use fixcheck_core::{CheckError, CheckOutcome};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the steps named in `failing`, passes the rest.
    struct ScriptedExecutor {
        failing: HashSet<String>,
        calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| n.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(&self, step: &CheckStep) -> CheckOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&step.name) {
                CheckOutcome::fail(&step.name, &CheckError::command_failure(1, "", "boom"), 0)
            } else {
                CheckOutcome::pass(&step.name, "exit code 0", 0)
            }
        }
    }

    fn steps(names: &[&str]) -> Vec<CheckStep> {
        names.iter().map(|n| CheckStep::command(*n, "true")).collect()
    }

    #[tokio::test]
    async fn test_empty_pipeline_passes_vacuously() {
        let pipeline = CheckPipeline::new("empty", Vec::new());
        let executor = ScriptedExecutor::failing(&[]);
        let mut reporter = MemoryReporter::new();

        let result = pipeline.run(&executor, &mut reporter).await.unwrap();
        assert!(result.passed);
        assert!(result.outcomes.is_empty());
        assert_eq!(result.state, PipelineState::Passed);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        for k in 1..=4usize {
            let names = ["s1", "s2", "s3", "s4"];
            let failing = names[k - 1];
            let pipeline = CheckPipeline::new("p", steps(&names));
            let executor = ScriptedExecutor::failing(&[failing, "s4"]);
            let mut reporter = MemoryReporter::new();

            let result = pipeline.run(&executor, &mut reporter).await.unwrap();
            assert!(!result.passed);
            assert_eq!(result.state, PipelineState::Failed);
            assert_eq!(result.outcomes.len(), k);
            assert_eq!(executor.calls.load(Ordering::SeqCst), k);
            assert!(!result.outcomes[k - 1].passed);
            assert_eq!(result.skipped_count(), 4 - k);
            assert_eq!(reporter.started_steps(), names[..k].to_vec());
        }
    }

    #[tokio::test]
    async fn test_collect_all_runs_every_step() {
        let pipeline = CheckPipeline::new("p", steps(&["a", "b", "c"]))
            .with_failure_policy(FailurePolicy::CollectAll);
        let executor = ScriptedExecutor::failing(&["a", "c"]);
        let mut reporter = MemoryReporter::new();

        let result = pipeline.run(&executor, &mut reporter).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(result.failed_count(), 2);
        assert_eq!(result.first_failure().unwrap().step_name, "a");
        assert_eq!(result.state, PipelineState::Failed);
    }

    #[tokio::test]
    async fn test_summary_only_reported_on_success() {
        let summary = vec!["guarantee".to_string()];

        let pipeline = CheckPipeline::new("p", steps(&["a"])).with_summary(summary.clone());
        let mut reporter = MemoryReporter::new();
        pipeline
            .run(&ScriptedExecutor::failing(&[]), &mut reporter)
            .await
            .unwrap();
        assert_eq!(reporter.final_summary(), Some(summary.as_slice()));

        let mut reporter = MemoryReporter::new();
        pipeline
            .run(&ScriptedExecutor::failing(&["a"]), &mut reporter)
            .await
            .unwrap();
        assert_eq!(reporter.final_summary(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_reporter_event_sequence() {
        let pipeline = CheckPipeline::new("p", steps(&["a", "b"]));
        let mut reporter = MemoryReporter::new();
        pipeline
            .run(&ScriptedExecutor::failing(&[]), &mut reporter)
            .await
            .unwrap();

        let kinds: Vec<&str> = reporter
            .events
            .iter()
            .map(|e| match e {
                ReportEvent::PipelineStarted { .. } => "pipeline_started",
                ReportEvent::StepStarted { .. } => "step_started",
                ReportEvent::StepFinished(_) => "step_finished",
                ReportEvent::PipelineFinished { .. } => "pipeline_finished",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "pipeline_started",
                "step_started",
                "step_finished",
                "step_started",
                "step_finished",
                "pipeline_finished",
            ]
        );
    }

    #[test]
    fn test_from_manifest_keeps_digest_and_summary() {
        let manifest = Manifest::session_fixes();
        let digest = manifest.digest();
        let pipeline = CheckPipeline::from_manifest(manifest);
        assert_eq!(pipeline.digest(), digest);
        assert_eq!(pipeline.summary().len(), 6);
        assert_eq!(pipeline.steps().len(), 5);
        assert_eq!(pipeline.name(), "session-fixes");
    }
}

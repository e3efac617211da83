use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::ReleaseConfig;
use crate::effects::Effects;
use crate::outcome::{ExecutionOutcome, ReleaseUserError};
use crate::{CommandContext, ReleaseRequest};

use super::artifacts::{format_bytes, ArtifactSummary};
use super::error::PipelineError;
use super::plan::{plan_release, ReleasePlan, StepAction, StepKind, StepPlan};
use super::steps::{
    build_distributions, clean_output_dir, collect_artifacts, ensure_safe_output_dir,
    install_tools, upload_artifacts,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub step: StepKind,
    pub status: StepStatus,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    fn finished(step: &StepPlan, code: Option<i32>, elapsed: Duration) -> Self {
        Self {
            step: step.kind,
            status: StepStatus::Ok,
            command: step.describe(),
            code,
            duration_ms: millis(elapsed),
            error: None,
        }
    }

    fn failed(step: &StepPlan, err: &PipelineError, elapsed: Duration) -> Self {
        Self {
            step: step.kind,
            status: StepStatus::Failed,
            command: step.describe(),
            code: err.tool_failure().and_then(|failure| failure.code),
            duration_ms: millis(elapsed),
            error: Some(err.to_string()),
        }
    }

    fn skipped(step: &StepPlan) -> Self {
        Self {
            step: step.kind,
            status: StepStatus::Skipped,
            command: step.describe(),
            code: None,
            duration_ms: 0,
            error: None,
        }
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub steps: Vec<StepReport>,
    pub artifacts: Vec<ArtifactSummary>,
    pub failures: Vec<(StepKind, PipelineError)>,
}

impl ReleaseReport {
    /// Whether the run as a whole failed. With `keep_going` only the last
    /// step that ran decides, as a plain shell script would.
    #[must_use]
    pub fn failed(&self, keep_going: bool) -> bool {
        if keep_going {
            self.steps
                .iter()
                .rev()
                .find(|report| report.status != StepStatus::Skipped)
                .is_some_and(|report| report.status == StepStatus::Failed)
        } else {
            !self.failures.is_empty()
        }
    }

    fn uploaded(&self) -> bool {
        self.steps
            .iter()
            .any(|report| report.step == StepKind::Upload && report.status == StepStatus::Ok)
    }

    fn into_outcome(self, config: &ReleaseConfig) -> ExecutionOutcome {
        let mut details = config.to_details();
        details["steps"] = json!(self.steps);
        details["artifacts"] = json!(self.artifacts);
        if !self.failures.is_empty() {
            details["failures"] = Value::Array(
                self.failures
                    .iter()
                    .map(|(step, err)| {
                        let mut entry = err.details();
                        entry["step"] = json!(step);
                        entry
                    })
                    .collect(),
            );
        }

        let deciding = if config.keep_going {
            self.failures.last()
        } else {
            self.failures.first()
        };
        if let Some((step, err)) = deciding.filter(|_| self.failed(config.keep_going)) {
            if let Value::Object(extra) = err.details() {
                for (key, value) in extra {
                    details[key.as_str()] = value;
                }
            }
            details["failed_step"] = json!(step);
            return ExecutionOutcome::failure(format!("pyrelease: {err}"), details);
        }

        let count = self.artifacts.len();
        let mut message = if self.uploaded() {
            format!(
                "pyrelease: uploaded {count} {} to {}",
                plural(count),
                config.registry.label
            )
        } else {
            let total: u64 = self.artifacts.iter().map(|artifact| artifact.bytes).sum();
            format!(
                "pyrelease: built {count} {} ({}) in {} (upload skipped)",
                plural(count),
                format_bytes(total),
                config.out_dir.display()
            )
        };
        if !self.failures.is_empty() {
            let failed = self.failures.len();
            message.push_str(&format!(
                "; {failed} earlier {} failed (--keep-going)",
                if failed == 1 { "step" } else { "steps" }
            ));
        }
        ExecutionOutcome::success(message, details)
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "artifact"
    } else {
        "artifacts"
    }
}

/// Cleans the output directory, upgrades the packaging tools, builds the
/// distributions and uploads them, halting at the first failing step unless
/// the request asks to keep going.
///
/// # Errors
/// Returns an error only for unexpected internal failures; configuration
/// problems and failing steps are reported through the outcome.
pub fn run_release(ctx: &CommandContext, request: &ReleaseRequest) -> Result<ExecutionOutcome> {
    let config = match ctx.release_config(request) {
        Ok(config) => config,
        Err(err) => return preflight_outcome(err),
    };
    if let Err(err) = ensure_safe_output_dir(&config.project_root, &config.out_dir) {
        return Ok(err.to_outcome());
    }

    let plan = plan_release(&config);
    if config.dry_run {
        return Ok(dry_run_outcome(&config, &plan));
    }
    if config.upload && config.credentials.is_none() {
        tracing::warn!(
            token_env = %config.token_env,
            "no upload token set; the upload tool will fall back to its own configuration"
        );
    }

    let report = execute_plan(ctx.effects(), &config, &plan);
    Ok(report.into_outcome(&config))
}

fn preflight_outcome(err: anyhow::Error) -> Result<ExecutionOutcome> {
    if let Some(pipeline) = err.downcast_ref::<PipelineError>() {
        return Ok(pipeline.to_outcome());
    }
    if let Some(user) = err.downcast_ref::<ReleaseUserError>() {
        return Ok(ExecutionOutcome::user_error(
            format!("pyrelease: {}", user.message()),
            user.details().clone(),
        ));
    }
    Err(err)
}

fn dry_run_outcome(config: &ReleaseConfig, plan: &ReleasePlan) -> ExecutionOutcome {
    let mut details = config.to_details();
    details["plan"] = plan.to_details();
    let message = format!(
        "pyrelease: dry-run ({} steps, registry={})",
        plan.steps.len(),
        config.registry.label
    );
    ExecutionOutcome::success(message, details)
}

/// Runs the planned steps in order.
pub fn execute_plan(
    effects: &dyn Effects,
    config: &ReleaseConfig,
    plan: &ReleasePlan,
) -> ReleaseReport {
    let mut report = ReleaseReport::default();
    for step in &plan.steps {
        if !report.failures.is_empty() && !config.keep_going {
            report.steps.push(StepReport::skipped(step));
            continue;
        }
        let span = tracing::info_span!("step", name = step.kind.label());
        let _entered = span.enter();
        tracing::info!(command = %step.describe(), "starting");

        let started = Instant::now();
        let result = run_step(effects, config, step, &mut report.artifacts);
        let elapsed = started.elapsed();
        match result {
            Ok(code) => {
                tracing::info!(duration_ms = millis(elapsed), "finished");
                report.steps.push(StepReport::finished(step, code, elapsed));
            }
            Err(err) => {
                if config.keep_going {
                    tracing::warn!(error = %err, "step failed; continuing");
                } else {
                    tracing::error!(error = %err, "step failed; halting");
                }
                report.steps.push(StepReport::failed(step, &err, elapsed));
                report.failures.push((step.kind, err));
            }
        }
    }
    report
}

fn run_step(
    effects: &dyn Effects,
    config: &ReleaseConfig,
    step: &StepPlan,
    artifacts: &mut Vec<ArtifactSummary>,
) -> Result<Option<i32>, PipelineError> {
    match &step.action {
        StepAction::Clean { dir } => {
            clean_output_dir(effects.fs(), &config.project_root, dir)?;
            Ok(None)
        }
        StepAction::Install {
            packages,
            invocation,
        } => install_tools(effects.tools(), packages, invocation).map(Some),
        StepAction::Build { invocation } => {
            let (code, produced) = build_distributions(
                effects.tools(),
                invocation,
                &config.project_root,
                &config.out_dir,
            )?;
            *artifacts = produced;
            Ok(Some(code))
        }
        StepAction::Upload { invocation } => {
            if artifacts.is_empty() {
                // Only reachable with --keep-going after a failed build.
                *artifacts = collect_artifacts(&config.project_root, &config.out_dir)?;
            }
            upload_artifacts(effects.tools(), invocation, artifacts).map(Some)
        }
    }
}

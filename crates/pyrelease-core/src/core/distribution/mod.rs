//! The clean, upgrade, build, upload pipeline.

mod artifacts;
mod error;
mod pipeline;
mod plan;
mod steps;

pub use artifacts::{format_bytes, short_sha, ArtifactSummary, BuildTargets};
pub use error::{PipelineError, ToolFailure};
pub use pipeline::{execute_plan, run_release, ReleaseReport, StepReport, StepStatus};
pub use plan::{plan_release, PublishRegistry, ReleasePlan, StepAction, StepKind, StepPlan};

pub(crate) use plan::{resolve_output_dir, resolve_publish_registry};

#![deny(clippy::all)]

mod core;

pub(crate) use crate::core::runtime::{effects, process};
pub(crate) use crate::core::tooling::outcome;
pub(crate) use crate::core::{config, distribution};

pub use crate::core::config::context::CommandContext;
pub use crate::core::config::{
    BuildBackend, Credentials, ProjectLayout, ProjectSettings, ReleaseConfig, ReleaseRequest,
    DEFAULT_OUT_DIR, DEFAULT_TOKEN_ENV, DEFAULT_USERNAME,
};
pub use crate::core::distribution::{
    execute_plan, format_bytes, plan_release, run_release, short_sha, ArtifactSummary,
    BuildTargets, PipelineError, PublishRegistry, ReleasePlan, ReleaseReport, StepAction,
    StepKind, StepPlan, StepReport, StepStatus, ToolFailure,
};
pub use crate::core::runtime::effects::{
    Effects, FileSystem, SharedEffects, SystemEffects, ToolRunner,
};
pub use crate::core::runtime::process::{RunOutput, ToolInvocation};
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome, ReleaseUserError};

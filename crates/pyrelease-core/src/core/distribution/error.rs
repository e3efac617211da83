use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};

use crate::outcome::ExecutionOutcome;

/// How an external tool failed.
#[derive(Clone, Debug, Serialize)]
pub struct ToolFailure {
    pub command: String,
    /// `None` when the program could not be started at all.
    pub code: Option<i32>,
    /// Spawn error, or the tail of the tool's stderr.
    pub message: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` exited with code {code}", self.command),
            None => write!(f, "`{}` could not be started: {}", self.command, self.message),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("no packaging metadata (setup.py or pyproject.toml) found in {}", .root.display())]
    MissingProjectMetadata { root: PathBuf },
    #[error("no python interpreter available: {message}")]
    InterpreterNotFound { message: String },
    #[error("refusing to clean {}: it is the project root or one of its parents", .dir.display())]
    UnsafeOutputDir { dir: PathBuf },
    #[error("failed to clean {}: {message}", .dir.display())]
    CleanupFailed { dir: PathBuf, message: String },
    #[error("installing {} failed: {failure}", .packages.join(", "))]
    ToolInstallFailed {
        packages: Vec<String>,
        failure: ToolFailure,
    },
    #[error("build failed: {failure}")]
    BuildFailed { failure: ToolFailure },
    #[error("no artifacts found in {}", .dir.display())]
    NoArtifacts { dir: PathBuf },
    #[error("failed to read artifacts in {}: {message}", .dir.display())]
    ArtifactScanFailed { dir: PathBuf, message: String },
    #[error("upload failed: {failure}")]
    UploadFailed { failure: ToolFailure },
}

impl PipelineError {
    /// Preflight problems the caller can fix; everything else is a failing step.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingProjectMetadata { .. }
                | PipelineError::InterpreterNotFound { .. }
                | PipelineError::UnsafeOutputDir { .. }
        )
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::MissingProjectMetadata { .. } => "missing_project_metadata",
            PipelineError::InterpreterNotFound { .. } => "interpreter_not_found",
            PipelineError::UnsafeOutputDir { .. } => "unsafe_output_dir",
            PipelineError::CleanupFailed { .. } => "cleanup_failed",
            PipelineError::ToolInstallFailed { .. } => "tool_install_failed",
            PipelineError::BuildFailed { .. } => "build_failed",
            PipelineError::NoArtifacts { .. } => "no_artifacts",
            PipelineError::ArtifactScanFailed { .. } => "artifact_scan_failed",
            PipelineError::UploadFailed { .. } => "upload_failed",
        }
    }

    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            PipelineError::MissingProjectMetadata { .. } => {
                "Run pyrelease from the project directory or pass --project <DIR>."
            }
            PipelineError::InterpreterNotFound { .. } => {
                "Install Python 3, pass --python <PATH>, or set PYRELEASE_PYTHON."
            }
            PipelineError::UnsafeOutputDir { .. } => {
                "Point --out at a dedicated directory such as dist/."
            }
            PipelineError::CleanupFailed { .. } => {
                "Check permissions on the output directory and remove it manually if needed."
            }
            PipelineError::ToolInstallFailed { .. } => {
                "Check network access and that `python -m pip` works for the selected interpreter."
            }
            PipelineError::BuildFailed { .. } => "Inspect the build output above and fix the build.",
            PipelineError::NoArtifacts { .. } => {
                "Ensure the build backend writes distributions into the output directory."
            }
            PipelineError::ArtifactScanFailed { .. } => {
                "Check that every file in the output directory is readable."
            }
            PipelineError::UploadFailed { .. } => {
                "Check the registry URL and that the upload token is valid for this project."
            }
        }
    }

    #[must_use]
    pub fn tool_failure(&self) -> Option<&ToolFailure> {
        match self {
            PipelineError::ToolInstallFailed { failure, .. }
            | PipelineError::BuildFailed { failure }
            | PipelineError::UploadFailed { failure } => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = json!({
            "reason": self.reason(),
            "error": self.to_string(),
            "hint": self.hint(),
        });
        if let Some(failure) = self.tool_failure() {
            details["command"] = json!(failure.command);
            details["code"] = json!(failure.code);
            if !failure.message.is_empty() {
                details["stderr"] = json!(failure.message);
            }
        }
        details
    }

    #[must_use]
    pub fn to_outcome(&self) -> ExecutionOutcome {
        let message = format!("pyrelease: {self}");
        if self.is_user_error() {
            ExecutionOutcome::user_error(message, self.details())
        } else {
            ExecutionOutcome::failure(message, self.details())
        }
    }
}

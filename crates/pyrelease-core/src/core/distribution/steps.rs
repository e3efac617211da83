use std::path::Path;

use crate::effects::{FileSystem, ToolRunner};
use crate::process::{tail_lines, RunOutput, ToolInvocation};

use super::artifacts::{collect_artifact_summaries, ArtifactSummary};
use super::error::{PipelineError, ToolFailure};
use super::plan::normalize_lexically;

const STDERR_TAIL_LINES: usize = 20;

/// Rejects output directories whose removal would take the project with it.
pub(crate) fn ensure_safe_output_dir(project_root: &Path, out_dir: &Path) -> Result<(), PipelineError> {
    let root = normalize_lexically(project_root);
    let mut candidates = vec![normalize_lexically(out_dir)];
    if let Ok(resolved) = out_dir.canonicalize() {
        candidates.push(resolved);
    }
    let canonical_root = project_root.canonicalize().ok();
    let unsafe_dir = candidates.iter().any(|dir| {
        root.starts_with(dir)
            || canonical_root
                .as_ref()
                .is_some_and(|canonical| canonical.starts_with(dir))
    });
    if unsafe_dir {
        return Err(PipelineError::UnsafeOutputDir {
            dir: out_dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Removes `out_dir` when present and recreates it empty.
pub(crate) fn clean_output_dir(
    fs: &dyn FileSystem,
    project_root: &Path,
    out_dir: &Path,
) -> Result<(), PipelineError> {
    ensure_safe_output_dir(project_root, out_dir)?;
    let cleanup_failed = |err: anyhow::Error| PipelineError::CleanupFailed {
        dir: out_dir.to_path_buf(),
        message: format!("{err:#}"),
    };
    if out_dir.exists() {
        tracing::debug!(dir = %out_dir.display(), "removing previous output");
        fs.remove_dir_all(out_dir).map_err(cleanup_failed)?;
    }
    fs.create_dir_all(out_dir).map_err(cleanup_failed)?;
    Ok(())
}

/// Runs one tool invocation, treating spawn errors and non-zero exits alike.
pub(crate) fn run_tool(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
) -> Result<RunOutput, ToolFailure> {
    let command = invocation.command_line();
    match runner.run(invocation) {
        Ok(output) if output.success() => Ok(output),
        Ok(output) => Err(ToolFailure {
            command,
            code: Some(output.code),
            message: tail_lines(output.stderr.trim_end(), STDERR_TAIL_LINES),
        }),
        Err(err) => Err(ToolFailure {
            command,
            code: None,
            message: format!("{err:#}"),
        }),
    }
}

pub(crate) fn install_tools(
    runner: &dyn ToolRunner,
    packages: &[String],
    invocation: &ToolInvocation,
) -> Result<i32, PipelineError> {
    tracing::info!(packages = %packages.join(" "), "upgrading packaging tools");
    run_tool(runner, invocation)
        .map(|output| output.code)
        .map_err(|failure| PipelineError::ToolInstallFailed {
            packages: packages.to_vec(),
            failure,
        })
}

/// Runs the build and returns what it left in the output directory.
pub(crate) fn build_distributions(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    project_root: &Path,
    out_dir: &Path,
) -> Result<(i32, Vec<ArtifactSummary>), PipelineError> {
    let output =
        run_tool(runner, invocation).map_err(|failure| PipelineError::BuildFailed { failure })?;
    let artifacts = collect_artifacts(project_root, out_dir)?;
    for artifact in &artifacts {
        tracing::info!(
            artifact = %artifact.path,
            bytes = artifact.bytes,
            sha256 = %artifact.short_sha(),
            "built"
        );
    }
    Ok((output.code, artifacts))
}

pub(crate) fn collect_artifacts(
    project_root: &Path,
    out_dir: &Path,
) -> Result<Vec<ArtifactSummary>, PipelineError> {
    let artifacts = collect_artifact_summaries(out_dir, project_root).map_err(|err| {
        PipelineError::ArtifactScanFailed {
            dir: out_dir.to_path_buf(),
            message: format!("{err:#}"),
        }
    })?;
    if artifacts.is_empty() {
        return Err(PipelineError::NoArtifacts {
            dir: out_dir.to_path_buf(),
        });
    }
    Ok(artifacts)
}

/// Uploads exactly `artifacts`, named explicitly rather than by glob.
pub(crate) fn upload_artifacts(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    artifacts: &[ArtifactSummary],
) -> Result<i32, PipelineError> {
    let files = artifacts
        .iter()
        .map(|artifact| artifact.absolute_path.display().to_string());
    let invocation = invocation.clone().args(files);
    tracing::info!(count = artifacts.len(), "uploading artifacts");
    run_tool(runner, &invocation)
        .map(|output| output.code)
        .map_err(|failure| PipelineError::UploadFailed { failure })
}

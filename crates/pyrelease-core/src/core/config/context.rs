use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use crate::config::settings::{
    configured_python, resolve_release_config, EnvSnapshot, ProjectLayout, ProjectSettings,
    ReleaseConfig, ReleaseRequest,
};
use crate::distribution::PipelineError;
use crate::effects::{self, Effects, SharedEffects};
use crate::outcome::ReleaseUserError;

pub struct CommandContext {
    env: EnvSnapshot,
    effects: SharedEffects,
}

impl CommandContext {
    /// Creates a context over a snapshot of the current process environment.
    #[must_use]
    pub fn new(effects: SharedEffects) -> Self {
        Self::with_env(effects, EnvSnapshot::capture())
    }

    pub(crate) fn with_env(effects: SharedEffects, env: EnvSnapshot) -> Self {
        Self { env, effects }
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn fs(&self) -> &dyn effects::FileSystem {
        self.effects.fs()
    }

    pub fn tools(&self) -> &dyn effects::ToolRunner {
        self.effects.tools()
    }

    /// Resolves the project directory named by the request, or the current
    /// directory.
    ///
    /// # Errors
    /// Returns a [`ReleaseUserError`] when the directory does not exist.
    pub fn project_root(&self, request: &ReleaseRequest) -> Result<PathBuf> {
        let cwd = env::current_dir().context("reading current directory")?;
        let candidate = match &request.project {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => cwd.join(path),
            None => cwd,
        };
        candidate.canonicalize().map_err(|err| {
            ReleaseUserError::new(
                format!("project directory {} not found", candidate.display()),
                json!({
                    "reason": "missing_project_dir",
                    "error": err.to_string(),
                    "hint": "Pass an existing directory to --project.",
                }),
            )
            .into()
        })
    }

    /// Builds the explicit configuration for one release run.
    ///
    /// # Errors
    /// Returns a [`PipelineError`] or [`ReleaseUserError`] for problems the
    /// caller can fix, such as missing packaging metadata or a bad
    /// `[tool.pyrelease]` table.
    pub fn release_config(&self, request: &ReleaseRequest) -> Result<ReleaseConfig> {
        let project_root = self.project_root(request)?;
        let layout = ProjectLayout::detect(&project_root);
        if !layout.has_metadata() {
            return Err(PipelineError::MissingProjectMetadata { root: project_root }.into());
        }

        let settings = if layout.has_pyproject {
            let path = project_root.join("pyproject.toml");
            let contents = self.fs().read_to_string(&path)?;
            ProjectSettings::from_pyproject(&contents, &path)?
        } else {
            ProjectSettings::default()
        };

        let python = match configured_python(request, &self.env, &settings) {
            Some(python) => python,
            None => self
                .tools()
                .detect_interpreter()
                .map_err(|err| PipelineError::InterpreterNotFound {
                    message: format!("{err:#}"),
                })?,
        };
        tracing::debug!(
            project = %project_root.display(),
            python = %python,
            "resolved release configuration inputs"
        );

        resolve_release_config(request, &self.env, &project_root, &settings, layout, python)
    }
}

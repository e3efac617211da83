use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use which::which;

use super::process::{run_command_streaming, RunOutput, ToolInvocation};

/// Runs the external packaging tools.
pub trait ToolRunner: Send + Sync {
    /// Locates a Python interpreter when none was configured.
    ///
    /// # Errors
    /// Returns an error when no interpreter is available.
    fn detect_interpreter(&self) -> Result<String>;

    /// Runs one invocation to completion.
    ///
    /// # Errors
    /// Returns an error when the program cannot be started. A non-zero exit is
    /// reported through [`RunOutput::code`], not as an error.
    fn run(&self, invocation: &ToolInvocation) -> Result<RunOutput>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

pub trait Effects: Send + Sync {
    fn tools(&self) -> &dyn ToolRunner;
    fn fs(&self) -> &dyn FileSystem;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    tools: Arc<SystemToolRunner>,
    fs: Arc<SystemFileSystem>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(SystemToolRunner),
            fs: Arc::new(SystemFileSystem),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn tools(&self) -> &dyn ToolRunner {
        self.tools.as_ref()
    }

    fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }
}

struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn detect_interpreter(&self) -> Result<String> {
        for candidate in ["python3", "python"] {
            if let Ok(path) = which(candidate) {
                return path
                    .into_os_string()
                    .into_string()
                    .map_err(|_| anyhow!("non-utf8 interpreter path"));
            }
        }
        bail!("no python interpreter found on PATH")
    }

    fn run(&self, invocation: &ToolInvocation) -> Result<RunOutput> {
        tracing::debug!(
            command = %invocation.command_line(),
            cwd = %invocation.cwd.display(),
            "spawning tool"
        );
        run_command_streaming(invocation)
    }
}

struct SystemFileSystem;

impl FileSystem for SystemFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path).with_context(|| format!("removing dir {}", path.display()))
    }
}

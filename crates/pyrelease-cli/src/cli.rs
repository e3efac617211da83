use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use pyrelease_core::{BuildBackend, ReleaseRequest};

pub const PYRELEASE_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nOptions:\n{options}\n{after-help}";

pub const PYRELEASE_BEFORE_HELP: &str = concat!(
    "pyrelease ",
    env!("CARGO_PKG_VERSION"),
    " – Clean, build, and upload a Python distribution\n\n",
    "\x1b[1;36mPipeline\x1b[0m\n",
    "  clean            Remove and recreate the output directory (default: dist/).\n",
    "  upgrade          pip install --upgrade the build tools, then twine.\n",
    "  build            Produce an sdist and a wheel into the output directory.\n",
    "  upload           twine upload exactly the artifacts the build produced.\n",
);

pub const PYRELEASE_AFTER_HELP: &str = concat!(
    "Examples:\n",
    "  pyrelease                              Run every step with defaults\n",
    "  pyrelease --dry-run                    Show the plan without touching anything\n",
    "  pyrelease --skip-upload --format wheel Build a wheel only\n",
    "  pyrelease --registry testpypi          Upload to TestPyPI\n\n",
    "The upload token is read from PYRELEASE_TOKEN unless --token-env names another variable.\n",
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BuildFormat {
    Sdist,
    Wheel,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Auto,
    Setuptools,
    Pep517,
}

impl From<BackendArg> for BuildBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Auto => BuildBackend::Auto,
            BackendArg::Setuptools => BuildBackend::Setuptools,
            BackendArg::Pep517 => BuildBackend::Pep517,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "pyrelease",
    author,
    version,
    before_help = PYRELEASE_BEFORE_HELP,
    after_help = PYRELEASE_AFTER_HELP,
    help_template = PYRELEASE_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct PyreleaseCli {
    #[arg(short, long, help = "Suppress human output (errors still print to stderr)")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit a {status,message,details} JSON envelope")]
    pub json: bool,
    #[arg(long, help = "Disable colored human output")]
    pub no_color: bool,

    #[arg(long, value_name = "DIR", help = "Project directory (default: current directory)")]
    pub project: Option<PathBuf>,
    #[arg(
        long,
        value_name = "DIR",
        help = "Output directory, relative to the project (default: dist)",
    )]
    pub out: Option<PathBuf>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Python interpreter used to run pip, the build, and twine",
    )]
    pub python: Option<String>,
    #[arg(
        long,
        value_enum,
        value_name = "BACKEND",
        help = "How to build: setup.py, python -m build, or auto-detect",
    )]
    pub backend: Option<BackendArg>,
    #[arg(
        long,
        value_enum,
        default_value_t = BuildFormat::Both,
        help = "Which distributions to build",
    )]
    pub format: BuildFormat,
    #[arg(
        long,
        value_name = "NAME|URL",
        help = "Upload target: pypi, testpypi, or a repository URL",
    )]
    pub registry: Option<String>,
    #[arg(long, value_name = "NAME", help = "Upload username (default: __token__)")]
    pub username: Option<String>,
    #[arg(long, value_name = "VAR", help = "Environment variable holding the upload token")]
    pub token_env: Option<String>,
    #[arg(long, help = "Skip upgrading the build and upload tools")]
    pub no_upgrade: bool,
    #[arg(long, help = "Build only; do not upload")]
    pub skip_upload: bool,
    #[arg(long, help = "Run every step even after a failure; the last step decides the status")]
    pub keep_going: bool,
    #[arg(long, help = "Print the planned commands without running them")]
    pub dry_run: bool,
}

impl PyreleaseCli {
    pub fn release_request(&self) -> ReleaseRequest {
        ReleaseRequest {
            project: self.project.clone(),
            out: self.out.clone(),
            python: self.python.clone(),
            backend: self.backend.map(BuildBackend::from),
            include_sdist: matches!(self.format, BuildFormat::Sdist | BuildFormat::Both),
            include_wheel: matches!(self.format, BuildFormat::Wheel | BuildFormat::Both),
            registry: self.registry.clone(),
            username: self.username.clone(),
            token_env: self.token_env.clone(),
            no_upgrade: self.no_upgrade,
            skip_upload: self.skip_upload,
            keep_going: self.keep_going,
            dry_run: self.dry_run,
        }
    }
}

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{BuildBackend, ReleaseConfig};
use crate::process::ToolInvocation;

pub(crate) fn resolve_output_dir(project_root: &Path, out: Option<&PathBuf>) -> PathBuf {
    let path = match out {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => project_root.join(path),
        None => project_root.join(crate::config::DEFAULT_OUT_DIR),
    };
    normalize_lexically(&path)
}

/// Drops `.` components and folds `..` without touching the filesystem.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishRegistry {
    pub label: String,
    pub url: String,
}

const PYPI_UPLOAD_URL: &str = "https://upload.pypi.org/legacy/";
const TEST_PYPI_UPLOAD_URL: &str = "https://test.pypi.org/legacy/";

pub(crate) fn resolve_publish_registry(selection: Option<&str>) -> PublishRegistry {
    let trimmed = selection.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    });
    match trimmed {
        None => PublishRegistry {
            label: "pypi".to_string(),
            url: PYPI_UPLOAD_URL.to_string(),
        },
        Some(value) if value.starts_with("http://") || value.starts_with("https://") => {
            PublishRegistry {
                label: value.to_string(),
                url: value.to_string(),
            }
        }
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "pypi" => PublishRegistry {
                label: "pypi".to_string(),
                url: PYPI_UPLOAD_URL.to_string(),
            },
            "testpypi" | "test-pypi" => PublishRegistry {
                label: value.to_string(),
                url: TEST_PYPI_UPLOAD_URL.to_string(),
            },
            _ => PublishRegistry {
                label: value.to_string(),
                url: format!("https://{value}/legacy/"),
            },
        },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Clean,
    InstallBuildTools,
    InstallUploadTools,
    Build,
    Upload,
}

impl StepKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            StepKind::Clean => "clean",
            StepKind::InstallBuildTools => "install-build-tools",
            StepKind::InstallUploadTools => "install-upload-tools",
            StepKind::Build => "build",
            StepKind::Upload => "upload",
        }
    }
}

#[derive(Clone, Debug)]
pub enum StepAction {
    Clean { dir: PathBuf },
    Install {
        packages: Vec<String>,
        invocation: ToolInvocation,
    },
    Build { invocation: ToolInvocation },
    /// The artifact paths are appended when the step runs.
    Upload { invocation: ToolInvocation },
}

#[derive(Clone, Debug)]
pub struct StepPlan {
    pub kind: StepKind,
    pub action: StepAction,
}

impl StepPlan {
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.action {
            StepAction::Clean { dir } => format!("remove and recreate {}", dir.display()),
            StepAction::Install { invocation, .. } | StepAction::Build { invocation } => {
                invocation.command_line()
            }
            StepAction::Upload { invocation } => {
                format!("{} <artifacts>", invocation.command_line())
            }
        }
    }

    fn to_details(&self) -> Value {
        let env = match &self.action {
            StepAction::Clean { .. } => Vec::new(),
            StepAction::Install { invocation, .. }
            | StepAction::Build { invocation }
            | StepAction::Upload { invocation } => invocation.redacted_envs(),
        };
        let env: serde_json::Map<String, Value> = env
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        json!({
            "step": self.kind,
            "command": self.describe(),
            "env": env,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ReleasePlan {
    pub steps: Vec<StepPlan>,
}

impl ReleasePlan {
    #[must_use]
    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|step| step.kind).collect()
    }

    pub(crate) fn to_details(&self) -> Value {
        Value::Array(self.steps.iter().map(StepPlan::to_details).collect())
    }
}

/// Derives the ordered steps for `config`. Pure: nothing runs here.
#[must_use]
pub fn plan_release(config: &ReleaseConfig) -> ReleasePlan {
    let mut steps = vec![StepPlan {
        kind: StepKind::Clean,
        action: StepAction::Clean {
            dir: config.out_dir.clone(),
        },
    }];
    if config.upgrade_tools {
        steps.push(install_step(
            StepKind::InstallBuildTools,
            config,
            &config.build_requires,
        ));
        if config.upload {
            steps.push(install_step(
                StepKind::InstallUploadTools,
                config,
                &config.upload_requires,
            ));
        }
    }
    steps.push(StepPlan {
        kind: StepKind::Build,
        action: StepAction::Build {
            invocation: build_invocation(config),
        },
    });
    if config.upload {
        steps.push(StepPlan {
            kind: StepKind::Upload,
            action: StepAction::Upload {
                invocation: upload_invocation(config),
            },
        });
    }
    ReleasePlan { steps }
}

fn install_step(kind: StepKind, config: &ReleaseConfig, packages: &[String]) -> StepPlan {
    let invocation = ToolInvocation::new(&config.python, &config.project_root)
        .args(["-m", "pip", "install", "--upgrade"])
        .args(packages.iter().cloned());
    StepPlan {
        kind,
        action: StepAction::Install {
            packages: packages.to_vec(),
            invocation,
        },
    }
}

fn build_invocation(config: &ReleaseConfig) -> ToolInvocation {
    let out = config.out_dir.display().to_string();
    let base = ToolInvocation::new(&config.python, &config.project_root);
    match config.backend {
        BuildBackend::Setuptools | BuildBackend::Auto => {
            let mut invocation = base.arg("setup.py");
            if config.targets.sdist {
                invocation = invocation.args(["sdist", "--dist-dir", out.as_str()]);
            }
            if config.targets.wheel {
                invocation = invocation.args(["bdist_wheel", "--dist-dir", out.as_str()]);
            }
            invocation
        }
        BuildBackend::Pep517 => {
            let mut invocation = base.args(["-m", "build"]);
            if config.targets.sdist {
                invocation = invocation.arg("--sdist");
            }
            if config.targets.wheel {
                invocation = invocation.arg("--wheel");
            }
            invocation.args(["--outdir", out.as_str(), "."])
        }
    }
}

fn upload_invocation(config: &ReleaseConfig) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(&config.python, &config.project_root).args([
        "-m",
        "twine",
        "upload",
        "--non-interactive",
        "--repository-url",
        config.registry.url.as_str(),
    ]);
    if let Some(credentials) = &config.credentials {
        invocation = invocation
            .env("TWINE_USERNAME", credentials.username.as_str())
            .env("TWINE_PASSWORD", credentials.password.as_str());
    }
    invocation
}

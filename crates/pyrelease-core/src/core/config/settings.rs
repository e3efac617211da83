use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use toml_edit::{DocumentMut, Item, Value as TomlValue};

use crate::distribution::{
    resolve_output_dir, resolve_publish_registry, BuildTargets, PublishRegistry,
};
use crate::outcome::ReleaseUserError;
use crate::process::REDACTED;

pub const DEFAULT_OUT_DIR: &str = "dist";
pub const DEFAULT_TOKEN_ENV: &str = "PYRELEASE_TOKEN";
pub const DEFAULT_USERNAME: &str = "__token__";

const PYTHON_ENV: &str = "PYRELEASE_PYTHON";
const REGISTRY_ENV: &str = "PYRELEASE_REGISTRY";
const TOKEN_ENV_ENV: &str = "PYRELEASE_TOKEN_ENV";
const USERNAME_ENV: &str = "PYRELEASE_USERNAME";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value of `key` when set to something other than whitespace.
    pub(crate) fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).map(str::trim).filter(|value| !value.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// How the distributions are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildBackend {
    /// `setuptools` when a `setup.py` exists, `pep517` otherwise.
    #[default]
    Auto,
    /// `python setup.py sdist bdist_wheel`.
    Setuptools,
    /// `python -m build`.
    Pep517,
}

impl BuildBackend {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            BuildBackend::Auto => "auto",
            BuildBackend::Setuptools => "setuptools",
            BuildBackend::Pep517 => "pep517",
        }
    }

    /// Packages the build step needs installed in the interpreter.
    #[must_use]
    pub fn default_requires(self) -> Vec<String> {
        match self {
            BuildBackend::Setuptools | BuildBackend::Auto => {
                vec!["setuptools".to_string(), "wheel".to_string()]
            }
            BuildBackend::Pep517 => vec!["build".to_string()],
        }
    }

    pub(crate) fn resolve(self, layout: ProjectLayout, root: &Path) -> Result<Self> {
        match self {
            BuildBackend::Auto if layout.has_setup_py => Ok(BuildBackend::Setuptools),
            BuildBackend::Auto => Ok(BuildBackend::Pep517),
            BuildBackend::Setuptools if !layout.has_setup_py => Err(ReleaseUserError::new(
                format!("setuptools backend requires setup.py in {}", root.display()),
                json!({
                    "reason": "backend_unavailable",
                    "backend": "setuptools",
                    "hint": "Use `--backend pep517` for pyproject-only projects.",
                }),
            )
            .into()),
            other => Ok(other),
        }
    }
}

impl FromStr for BuildBackend {
    type Err = ReleaseUserError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BuildBackend::Auto),
            "setuptools" | "setup.py" => Ok(BuildBackend::Setuptools),
            "pep517" | "build" => Ok(BuildBackend::Pep517),
            other => Err(ReleaseUserError::new(
                format!("unknown build backend `{other}`"),
                json!({
                    "reason": "invalid_backend",
                    "backend": other,
                    "hint": "Choose one of: auto, setuptools, pep517.",
                }),
            )),
        }
    }
}

/// Which packaging metadata files the project carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectLayout {
    pub has_setup_py: bool,
    pub has_pyproject: bool,
}

impl ProjectLayout {
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        Self {
            has_setup_py: root.join("setup.py").is_file(),
            has_pyproject: root.join("pyproject.toml").is_file(),
        }
    }

    #[must_use]
    pub fn has_metadata(self) -> bool {
        self.has_setup_py || self.has_pyproject
    }
}

/// Overrides read from `[tool.pyrelease]` in `pyproject.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSettings {
    pub out_dir: Option<PathBuf>,
    pub backend: Option<BuildBackend>,
    pub python: Option<String>,
    pub registry: Option<String>,
    pub username: Option<String>,
    pub token_env: Option<String>,
    pub build_requires: Option<Vec<String>>,
    pub upload_requires: Option<Vec<String>>,
}

impl ProjectSettings {
    /// Parses the `[tool.pyrelease]` table; a missing table yields defaults.
    ///
    /// # Errors
    /// Returns a [`ReleaseUserError`] when the document is not valid TOML or a
    /// key has the wrong type.
    pub fn from_pyproject(contents: &str, path: &Path) -> Result<Self> {
        let doc: DocumentMut = contents.parse().map_err(|err| {
            ReleaseUserError::new(
                format!("failed to parse {}", path.display()),
                json!({
                    "reason": "invalid_pyproject",
                    "error": format!("{err}"),
                    "hint": "Fix the TOML syntax error and retry.",
                }),
            )
        })?;
        let Some(table) = doc
            .get("tool")
            .and_then(|tool| tool.get("pyrelease"))
            .and_then(Item::as_table_like)
        else {
            return Ok(Self::default());
        };

        let mut settings = Self::default();
        for (key, item) in table.iter() {
            match key {
                "out-dir" => settings.out_dir = Some(PathBuf::from(expect_str(key, item)?)),
                "backend" => settings.backend = Some(expect_str(key, item)?.parse()?),
                "python" => settings.python = Some(expect_str(key, item)?),
                "registry" => settings.registry = Some(expect_str(key, item)?),
                "username" => settings.username = Some(expect_str(key, item)?),
                "token-env" => settings.token_env = Some(expect_str(key, item)?),
                "build-requires" => settings.build_requires = Some(expect_str_list(key, item)?),
                "upload-requires" => {
                    settings.upload_requires = Some(expect_str_list(key, item)?);
                }
                other => {
                    tracing::warn!(key = other, "ignoring unknown [tool.pyrelease] setting");
                }
            }
        }
        Ok(settings)
    }
}

fn invalid_setting(key: &str, expected: &str) -> ReleaseUserError {
    ReleaseUserError::new(
        format!("[tool.pyrelease].{key} must be {expected}"),
        json!({
            "reason": "invalid_tool_setting",
            "key": key,
            "hint": format!("Set `{key}` to {expected} in pyproject.toml."),
        }),
    )
}

fn expect_str(key: &str, item: &Item) -> Result<String, ReleaseUserError> {
    item.as_str()
        .map(ToString::to_string)
        .ok_or_else(|| invalid_setting(key, "a string"))
}

fn expect_str_list(key: &str, item: &Item) -> Result<Vec<String>, ReleaseUserError> {
    let array = item
        .as_array()
        .ok_or_else(|| invalid_setting(key, "an array of strings"))?;
    array
        .iter()
        .map(|value| {
            TomlValue::as_str(value)
                .map(ToString::to_string)
                .ok_or_else(|| invalid_setting(key, "an array of strings"))
        })
        .collect()
}

/// Caller-supplied options; every field is optional so that an empty request
/// reproduces the plain clean/upgrade/build/upload run.
#[derive(Clone, Debug, Default)]
pub struct ReleaseRequest {
    pub project: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub python: Option<String>,
    pub backend: Option<BuildBackend>,
    pub include_sdist: bool,
    pub include_wheel: bool,
    pub registry: Option<String>,
    pub username: Option<String>,
    pub token_env: Option<String>,
    pub no_upgrade: bool,
    pub skip_upload: bool,
    pub keep_going: bool,
    pub dry_run: bool,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Everything the pipeline needs, resolved up front. Nothing downstream reads
/// the process environment.
#[derive(Clone, Debug)]
pub struct ReleaseConfig {
    pub project_root: PathBuf,
    pub out_dir: PathBuf,
    pub python: String,
    pub backend: BuildBackend,
    pub targets: BuildTargets,
    pub build_requires: Vec<String>,
    pub upload_requires: Vec<String>,
    pub registry: PublishRegistry,
    pub username: String,
    pub token_env: String,
    pub credentials: Option<Credentials>,
    pub upgrade_tools: bool,
    pub upload: bool,
    pub keep_going: bool,
    pub dry_run: bool,
}

impl ReleaseConfig {
    pub(crate) fn to_details(&self) -> Value {
        json!({
            "project_root": self.project_root.display().to_string(),
            "out_dir": self.out_dir.display().to_string(),
            "python": self.python,
            "backend": self.backend.label(),
            "format": self.targets.label(),
            "registry": self.registry.label,
            "registry_url": self.registry.url,
            "credentials": {
                "username": self.username,
                "token_env": self.token_env,
                "token": self.credentials.as_ref().map(|_| REDACTED),
            },
            "keep_going": self.keep_going,
            "dry_run": self.dry_run,
        })
    }
}

pub(crate) fn configured_python(
    request: &ReleaseRequest,
    env: &EnvSnapshot,
    settings: &ProjectSettings,
) -> Option<String> {
    request
        .python
        .clone()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| env.non_empty(PYTHON_ENV).map(ToString::to_string))
        .or_else(|| settings.python.clone())
}

/// Layers request, environment, project settings and defaults, in that order
/// of precedence.
pub(crate) fn resolve_release_config(
    request: &ReleaseRequest,
    env: &EnvSnapshot,
    project_root: &Path,
    settings: &ProjectSettings,
    layout: ProjectLayout,
    python: String,
) -> Result<ReleaseConfig> {
    let backend = request
        .backend
        .or(settings.backend)
        .unwrap_or_default()
        .resolve(layout, project_root)?;
    let out = request.out.clone().or_else(|| settings.out_dir.clone());
    let out_dir = resolve_output_dir(project_root, out.as_ref());

    let registry_selection = request
        .registry
        .clone()
        .or_else(|| env.non_empty(REGISTRY_ENV).map(ToString::to_string))
        .or_else(|| settings.registry.clone());
    let registry = resolve_publish_registry(registry_selection.as_deref());

    let username = request
        .username
        .clone()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| env.non_empty(USERNAME_ENV).map(ToString::to_string))
        .or_else(|| settings.username.clone())
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
    let token_env = request
        .token_env
        .clone()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| env.non_empty(TOKEN_ENV_ENV).map(ToString::to_string))
        .or_else(|| settings.token_env.clone())
        .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string());
    let credentials = env.non_empty(&token_env).map(|token| Credentials {
        username: username.clone(),
        password: token.to_string(),
    });

    Ok(ReleaseConfig {
        project_root: project_root.to_path_buf(),
        out_dir,
        python,
        backend,
        targets: BuildTargets::from_flags(request.include_sdist, request.include_wheel),
        build_requires: settings
            .build_requires
            .clone()
            .unwrap_or_else(|| backend.default_requires()),
        upload_requires: settings
            .upload_requires
            .clone()
            .unwrap_or_else(|| vec!["twine".to_string()]),
        registry,
        username,
        token_env,
        credentials,
        upgrade_tools: !request.no_upgrade,
        upload: !request.skip_upload,
        keep_going: request.keep_going,
        dry_run: request.dry_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PYPROJECT: &str = r#"
[project]
name = "demo"
version = "0.1.0"

[tool.pyrelease]
out-dir = "build/dist"
backend = "pep517"
registry = "testpypi"
token-env = "DEMO_TOKEN"
build-requires = ["build>=1.0"]
"#;

    fn setup_py_layout() -> ProjectLayout {
        ProjectLayout {
            has_setup_py: true,
            has_pyproject: false,
        }
    }

    #[test]
    fn project_settings_reads_tool_table() -> Result<()> {
        let settings = ProjectSettings::from_pyproject(PYPROJECT, Path::new("pyproject.toml"))?;
        assert_eq!(settings.out_dir, Some(PathBuf::from("build/dist")));
        assert_eq!(settings.backend, Some(BuildBackend::Pep517));
        assert_eq!(settings.registry.as_deref(), Some("testpypi"));
        assert_eq!(settings.token_env.as_deref(), Some("DEMO_TOKEN"));
        assert_eq!(settings.build_requires, Some(vec!["build>=1.0".to_string()]));
        assert_eq!(settings.upload_requires, None);
        Ok(())
    }

    #[test]
    fn project_settings_default_without_tool_table() -> Result<()> {
        let settings = ProjectSettings::from_pyproject(
            "[project]\nname = \"demo\"\n",
            Path::new("pyproject.toml"),
        )?;
        assert_eq!(settings, ProjectSettings::default());
        Ok(())
    }

    #[test]
    fn project_settings_rejects_wrong_types() {
        let err = ProjectSettings::from_pyproject(
            "[tool.pyrelease]\nbuild-requires = \"build\"\n",
            Path::new("pyproject.toml"),
        )
        .expect_err("string is not a list");
        let user = err
            .downcast_ref::<ReleaseUserError>()
            .expect("user error");
        assert_eq!(user.details()["reason"], "invalid_tool_setting");
        assert_eq!(user.details()["key"], "build-requires");
    }

    #[test]
    fn project_settings_rejects_unknown_backend() {
        let err = ProjectSettings::from_pyproject(
            "[tool.pyrelease]\nbackend = \"poetry\"\n",
            Path::new("pyproject.toml"),
        )
        .expect_err("unknown backend");
        assert!(err.to_string().contains("unknown build backend"), "{err}");
    }

    #[test]
    fn empty_request_reproduces_default_run() -> Result<()> {
        let root = tempdir()?;
        let env = EnvSnapshot::testing(&[(DEFAULT_TOKEN_ENV, "pypi-secret")]);
        let config = resolve_release_config(
            &ReleaseRequest::default(),
            &env,
            root.path(),
            &ProjectSettings::default(),
            setup_py_layout(),
            "python3".into(),
        )?;
        assert_eq!(config.out_dir, root.path().join("dist"));
        assert_eq!(config.backend, BuildBackend::Setuptools);
        assert!(config.targets.sdist && config.targets.wheel);
        assert_eq!(config.build_requires, vec!["setuptools", "wheel"]);
        assert_eq!(config.upload_requires, vec!["twine"]);
        assert_eq!(config.registry.label, "pypi");
        assert!(config.upgrade_tools && config.upload);
        assert!(!config.keep_going && !config.dry_run);
        let credentials = config.credentials.expect("token from env");
        assert_eq!(credentials.username, "__token__");
        assert_eq!(credentials.password, "pypi-secret");
        Ok(())
    }

    #[test]
    fn request_overrides_environment_and_settings() -> Result<()> {
        let root = tempdir()?;
        let settings = ProjectSettings::from_pyproject(PYPROJECT, Path::new("pyproject.toml"))?;
        let env = EnvSnapshot::testing(&[
            (REGISTRY_ENV, "pypi"),
            ("CUSTOM_TOKEN", "secret"),
            ("DEMO_TOKEN", "ignored"),
        ]);
        let request = ReleaseRequest {
            registry: Some("https://upload.example.invalid/legacy/".into()),
            token_env: Some("CUSTOM_TOKEN".into()),
            out: Some(PathBuf::from("out")),
            ..ReleaseRequest::default()
        };
        let layout = ProjectLayout {
            has_setup_py: false,
            has_pyproject: true,
        };
        let config =
            resolve_release_config(&request, &env, root.path(), &settings, layout, "py".into())?;
        assert_eq!(config.registry.url, "https://upload.example.invalid/legacy/");
        assert_eq!(config.token_env, "CUSTOM_TOKEN");
        assert_eq!(config.out_dir, root.path().join("out"));
        assert_eq!(config.backend, BuildBackend::Pep517);
        assert_eq!(config.build_requires, vec!["build>=1.0"]);
        assert_eq!(
            config.credentials.map(|c| c.password).as_deref(),
            Some("secret")
        );
        Ok(())
    }

    #[test]
    fn environment_overrides_settings() -> Result<()> {
        let root = tempdir()?;
        let settings = ProjectSettings::from_pyproject(PYPROJECT, Path::new("pyproject.toml"))?;
        let env = EnvSnapshot::testing(&[(REGISTRY_ENV, "pypi"), (TOKEN_ENV_ENV, "OTHER")]);
        let layout = ProjectLayout {
            has_setup_py: false,
            has_pyproject: true,
        };
        let config = resolve_release_config(
            &ReleaseRequest::default(),
            &env,
            root.path(),
            &settings,
            layout,
            "py".into(),
        )?;
        assert_eq!(config.registry.label, "pypi");
        assert_eq!(config.token_env, "OTHER");
        assert!(config.credentials.is_none(), "OTHER is unset");
        Ok(())
    }

    #[test]
    fn blank_token_yields_no_credentials() -> Result<()> {
        let root = tempdir()?;
        let env = EnvSnapshot::testing(&[(DEFAULT_TOKEN_ENV, "   ")]);
        let config = resolve_release_config(
            &ReleaseRequest::default(),
            &env,
            root.path(),
            &ProjectSettings::default(),
            setup_py_layout(),
            "python3".into(),
        )?;
        assert!(config.credentials.is_none());
        Ok(())
    }

    #[test]
    fn setuptools_backend_requires_setup_py() {
        let layout = ProjectLayout {
            has_setup_py: false,
            has_pyproject: true,
        };
        let err = BuildBackend::Setuptools
            .resolve(layout, Path::new("/proj"))
            .expect_err("no setup.py");
        assert!(err.to_string().contains("requires setup.py"), "{err}");
        assert_eq!(
            BuildBackend::Auto.resolve(layout, Path::new("/proj")).ok(),
            Some(BuildBackend::Pep517)
        );
    }

    #[test]
    fn python_precedence_prefers_request() {
        let settings = ProjectSettings {
            python: Some("settings-python".into()),
            ..ProjectSettings::default()
        };
        let env = EnvSnapshot::testing(&[(PYTHON_ENV, "env-python")]);
        let request = ReleaseRequest {
            python: Some("request-python".into()),
            ..ReleaseRequest::default()
        };
        assert_eq!(
            configured_python(&request, &env, &settings).as_deref(),
            Some("request-python")
        );
        assert_eq!(
            configured_python(&ReleaseRequest::default(), &env, &settings).as_deref(),
            Some("env-python")
        );
        assert_eq!(
            configured_python(
                &ReleaseRequest::default(),
                &EnvSnapshot::testing(&[]),
                &settings
            )
            .as_deref(),
            Some("settings-python")
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials {
            username: "__token__".into(),
            password: "pypi-secret".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("pypi-secret"), "{rendered}");
        assert!(rendered.contains(REDACTED));
    }
}

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub const SDIST: &str = "demo-0.1.0.tar.gz";
pub const WHEEL: &str = "demo-0.1.0-py3-none-any.whl";
pub const TOKEN: &str = "pypi-test-secret-token";

/// A stand-in interpreter that logs each invocation, writes two artifacts when
/// asked to build, and fails with status 3 for the mode named in
/// `FAKE_PYTHON_FAIL` (`install`, `build` or `upload`).
const FAKE_PYTHON: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_PYTHON_LOG"
mode=other
case "$1 $2" in
  "-m pip") mode=install ;;
  "-m twine") mode=upload ;;
  "-m build") mode=build ;;
esac
if [ "$1" = "setup.py" ]; then
  mode=build
fi
if [ -n "$FAKE_PYTHON_FAIL" ] && [ "$FAKE_PYTHON_FAIL" = "$mode" ]; then
  echo "fake $mode failure" >&2
  exit 3
fi
if [ "$mode" = build ]; then
  out=""
  prev=""
  for arg in "$@"; do
    if [ "$prev" = "--dist-dir" ] || [ "$prev" = "--outdir" ]; then
      out="$arg"
    fi
    prev="$arg"
  done
  mkdir -p "$out"
  printf 'sdist' > "$out/demo-0.1.0.tar.gz"
  printf 'wheel' > "$out/demo-0.1.0-py3-none-any.whl"
fi
if [ "$mode" = upload ]; then
  echo "upload-user=$TWINE_USERNAME password-set=${TWINE_PASSWORD:+yes}" >> "$FAKE_PYTHON_LOG"
fi
exit 0
"#;

pub struct Fixture {
    _temp: TempDir,
    pub project: PathBuf,
    pub python: PathBuf,
    pub log: PathBuf,
}

impl Fixture {
    pub fn dist(&self) -> PathBuf {
        self.project.join("dist")
    }

    pub fn log_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// A `pyrelease` command pointed at the fixture project and interpreter,
    /// isolated from any `PYRELEASE_*` variables in the caller's environment.
    pub fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("pyrelease");
        for key in [
            "PYRELEASE_PYTHON",
            "PYRELEASE_REGISTRY",
            "PYRELEASE_TOKEN_ENV",
            "PYRELEASE_USERNAME",
            "PYRELEASE_TOKEN",
            "FAKE_PYTHON_FAIL",
        ] {
            cmd.env_remove(key);
        }
        cmd.env("FAKE_PYTHON_LOG", &self.log)
            .env("NO_COLOR", "1")
            .arg("--project")
            .arg(&self.project)
            .arg("--python")
            .arg(&self.python);
        cmd
    }
}

pub fn setup_py_fixture(prefix: &str) -> Fixture {
    let fixture = empty_fixture(prefix);
    fs::write(
        fixture.project.join("setup.py"),
        "from setuptools import setup\nsetup(name='demo', version='0.1.0')\n",
    )
    .expect("setup.py");
    fixture
}

pub fn pyproject_fixture(prefix: &str) -> Fixture {
    let fixture = empty_fixture(prefix);
    fs::write(
        fixture.project.join("pyproject.toml"),
        "[project]\nname = \"demo\"\nversion = \"0.1.0\"\n",
    )
    .expect("pyproject.toml");
    fixture
}

pub fn empty_fixture(prefix: &str) -> Fixture {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("tempdir");
    let root = temp.path().canonicalize().expect("canonical tempdir");
    let project = root.join("demo");
    fs::create_dir_all(&project).expect("project dir");
    let python = root.join("fake-python");
    write_executable(&python, FAKE_PYTHON);
    Fixture {
        _temp: temp,
        project,
        python,
        log: root.join("python.log"),
    }
}

fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, contents).expect("write script");
    let mut perms = fs::metadata(path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod script");
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stdout(assert: &Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout")
}

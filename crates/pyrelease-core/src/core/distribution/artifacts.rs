use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildTargets {
    pub sdist: bool,
    pub wheel: bool,
}

impl BuildTargets {
    /// Neither flag selected means both.
    #[must_use]
    pub fn from_flags(sdist: bool, wheel: bool) -> Self {
        if !sdist && !wheel {
            Self {
                sdist: true,
                wheel: true,
            }
        } else {
            Self { sdist, wheel }
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match (self.sdist, self.wheel) {
            (true, true) => "both",
            (true, false) => "sdist",
            (false, true) => "wheel",
            (false, false) => "none",
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ArtifactSummary {
    /// Path relative to the project root.
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
    #[serde(skip)]
    pub absolute_path: PathBuf,
}

impl ArtifactSummary {
    #[must_use]
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha256)
    }
}

const SHORT_SHA_LEN: usize = 12;

/// Abbreviated digest shown next to artifact names.
#[must_use]
pub fn short_sha(sha256: &str) -> &str {
    sha256.get(..SHORT_SHA_LEN).unwrap_or(sha256)
}

/// Summarizes every regular, non-hidden file directly inside `dir`, sorted by
/// path. A missing directory yields no artifacts.
pub(crate) fn collect_artifact_summaries(
    dir: &Path,
    project_root: &Path,
) -> Result<Vec<ArtifactSummary>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() || is_hidden(&path) {
            continue;
        }
        let bytes = fs::metadata(&path)
            .with_context(|| format!("reading metadata for {}", path.display()))?
            .len();
        let sha256 =
            compute_file_sha256(&path).with_context(|| format!("hashing {}", path.display()))?;
        entries.push(ArtifactSummary {
            path: relative_path_str(&path, project_root),
            bytes,
            sha256,
            absolute_path: path,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

pub(crate) fn compute_file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub(crate) fn relative_path_str(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    fn format_scaled(value: u64, unit: u64, suffix: &str) -> String {
        let whole = value / unit;
        let remainder = value % unit;
        let tenths = (remainder * 10) / unit;
        format!("{whole}.{tenths} {suffix}")
    }

    if bytes >= MB {
        format_scaled(bytes, MB, "MB")
    } else if bytes >= KB {
        format_scaled(bytes, KB, "KB")
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn short_sha_abbreviates_without_panicking_on_short_input() {
        let digest = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(short_sha(digest), "e3b0c44298fc");
        assert_eq!(short_sha("abc"), "abc");
        let summary = ArtifactSummary {
            path: "dist/demo-0.1.0.tar.gz".into(),
            bytes: 0,
            sha256: digest.into(),
            absolute_path: PathBuf::from("/proj/dist/demo-0.1.0.tar.gz"),
        };
        assert_eq!(summary.short_sha(), short_sha(digest));
    }

    #[test]
    fn build_targets_default_to_both_when_not_selected() {
        let targets = BuildTargets::from_flags(false, false);
        assert!(targets.sdist, "sdist should be selected by default");
        assert!(targets.wheel, "wheel should be selected by default");
        assert_eq!(BuildTargets::from_flags(true, false).label(), "sdist");
        assert_eq!(BuildTargets::from_flags(false, true).label(), "wheel");
    }

    #[test]
    fn collect_artifact_summaries_lists_sorted_files() -> Result<()> {
        let root = tempdir()?;
        let dist = root.path().join("dist");
        fs::create_dir_all(dist.join("nested"))?;
        fs::write(dist.join("demo-0.1.0.tar.gz"), b"sdist")?;
        fs::write(dist.join("demo-0.1.0-py3-none-any.whl"), b"wheel")?;
        fs::write(dist.join(".DS_Store"), b"noise")?;

        let artifacts = collect_artifact_summaries(&dist, root.path())?;
        let paths: Vec<&str> = artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["dist/demo-0.1.0-py3-none-any.whl", "dist/demo-0.1.0.tar.gz"]
        );
        assert_eq!(artifacts[1].bytes, 5);
        assert_eq!(artifacts[1].sha256, compute_file_sha256(&dist.join("demo-0.1.0.tar.gz"))?);
        assert_eq!(artifacts[1].short_sha().len(), 12);
        assert_eq!(artifacts[0].absolute_path, dist.join("demo-0.1.0-py3-none-any.whl"));
        Ok(())
    }

    #[test]
    fn collect_artifact_summaries_tolerates_missing_dir() -> Result<()> {
        let root = tempdir()?;
        let artifacts = collect_artifact_summaries(&root.path().join("dist"), root.path())?;
        assert!(artifacts.is_empty());
        Ok(())
    }

    #[test]
    fn compute_file_sha256_matches_known_digest() -> Result<()> {
        let root = tempdir()?;
        let path = root.path().join("empty");
        fs::write(&path, b"")?;
        assert_eq!(
            compute_file_sha256(&path)?,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        Ok(())
    }

    #[test]
    fn format_bytes_scales_values() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
    }
}

//! Installed-bundle manifests: which files each bundle placed on disk.
//!
//! One TOML file per installed bundle lives in the manifest directory,
//! written at the end of a successful install and consumed by uninstall
//! (delete the listed paths, then the manifest) and by the lockfile codec
//! (which builds the dependency graph from the recorded dependency lists).
//!
//! ```toml
//! repo = "https://example.com/x.git"
//! sha = "a1b2c3..."
//! dependencies = ["git::https://example.com/dep.git::v2"]
//! paths = ["/home/dev/.bpm/lib/libx.a", "/home/dev/.bpm/include/x.h"]
//! ```
//!
//! A manifest with neither `repo` nor `sha` marks a purely local/dev
//! bundle; those are excluded from lockfiles.
//!
//! Removal is deliberately best-effort and non-transactional: paths are
//! deleted in listed order, a missing path is reported and skipped, and a
//! crash mid-removal leaves a manifest pointing at a subset of
//! already-deleted paths. That matches the append-only way paths are
//! recorded during the install phase.

use crate::core::BpmError;
use crate::descriptor::RawDependency;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// Persisted record of one installed bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstalledManifest {
    /// Repository the bundle came from; absent for local/dev bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Commit hash (VCS) or archive checksum pinning the installed state;
    /// absent for local/dev bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    /// Dependencies as declared by the bundle's build description, in
    /// declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<RawDependency>,
    /// Absolute paths of every file or directory the install phase placed.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl InstalledManifest {
    /// Whether the manifest carries a pin usable in a lockfile.
    pub fn is_pinned(&self) -> bool {
        self.repo.is_some() || self.sha.is_some()
    }
}

/// Store of installed-bundle manifests, one file per bundle.
#[derive(Debug)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// Store rooted at `dir` (usually the configured manifest directory).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn manifest_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.toml"))
    }

    /// Persist `manifest` under `name`, creating the directory as needed.
    ///
    /// Manifests are keyed by bundle name, so two repositories sharing a
    /// final path segment would map to the same file; overwriting a record
    /// that names a different repo fails with
    /// [`BpmError::ManifestConflict`] instead of silently losing it.
    pub fn save(&self, name: &str, manifest: &InstalledManifest) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating manifest directory {}", self.dir.display()))?;
        let path = self.manifest_path(name);
        if let (Ok(existing), Some(incoming)) = (self.find(name), &manifest.repo) {
            if let Some(recorded) = &existing.repo {
                if recorded != incoming {
                    return Err(BpmError::ManifestConflict {
                        name: name.to_string(),
                        existing: recorded.clone(),
                        incoming: incoming.clone(),
                    }
                    .into());
                }
            }
        }
        let text = toml::to_string_pretty(manifest).map_err(BpmError::from)?;
        std::fs::write(&path, text)
            .with_context(|| format!("writing manifest {}", path.display()))?;
        tracing::debug!(target: "manifest", "recorded manifest for '{name}'");
        Ok(())
    }

    /// Load the manifest for `name`, failing with
    /// [`BpmError::ManifestNotFound`] when it was never installed.
    pub fn find(&self, name: &str) -> Result<InstalledManifest> {
        let path = self.manifest_path(name);
        if !path.is_file() {
            return Err(BpmError::ManifestNotFound {
                name: name.to_string(),
            }
            .into());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let manifest = toml::from_str(&text).map_err(BpmError::from)?;
        Ok(manifest)
    }

    /// Load every manifest in the store, paired with its bundle name.
    /// Unreadable entries are skipped with a warning rather than failing
    /// the whole enumeration.
    pub fn load_all(&self) -> Result<Vec<(String, InstalledManifest)>> {
        let mut manifests = Vec::new();
        if !self.dir.is_dir() {
            return Ok(manifests);
        }
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("reading manifest directory {}", self.dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| toml::from_str(&text).map_err(anyhow::Error::from))
            {
                Ok(manifest) => manifests.push((name, manifest)),
                Err(e) => {
                    tracing::warn!(
                        target: "manifest",
                        "skipping unreadable manifest {}: {e:#}",
                        path.display()
                    );
                }
            }
        }
        Ok(manifests)
    }

    /// Uninstall `name`: delete every recorded path in listed order, then
    /// the manifest file itself.
    ///
    /// Path deletion is best-effort: a missing path is logged and skipped.
    /// Returns the number of paths actually removed.
    pub fn remove(&self, name: &str) -> Result<usize> {
        let manifest = self.find(name)?;
        let mut removed = 0;
        for path in &manifest.paths {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            match result {
                Ok(()) => {
                    tracing::debug!(target: "manifest", "removed {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(
                        target: "manifest",
                        "already gone, skipping: {}",
                        path.display()
                    );
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("removing {}", path.display()));
                }
            }
        }
        std::fs::remove_file(self.manifest_path(name))
            .with_context(|| format!("removing manifest for '{name}'"))?;
        tracing::info!(target: "manifest", "uninstalled '{name}' ({removed} paths)");
        Ok(removed)
    }
}

/// Append-only accumulator of installed paths for the current install run.
///
/// The install phase's rules call [`record`](Self::record) for every file
/// or directory they place; the installer drains the accumulator into the
/// bundle's manifest when the run succeeds. Process-scoped, like the
/// working directory: one install traversal per process.
#[derive(Debug, Default)]
pub struct InstallTracker {
    paths: Mutex<Vec<PathBuf>>,
}

impl InstallTracker {
    /// Fresh, empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one installed destination path.
    pub fn record(&self, path: impl Into<PathBuf>) {
        self.paths
            .lock()
            .expect("tracker lock poisoned")
            .push(path.into());
    }

    /// Take every path recorded since the last drain, in recording order.
    pub fn drain(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.paths.lock().expect("tracker lock poisoned"))
    }

    /// Position marker for the current recording length. A nested install
    /// marks before running its phases and drains from that mark, so paths
    /// a parent's rules recorded earlier stay attributed to the parent.
    pub fn mark(&self) -> usize {
        self.paths.lock().expect("tracker lock poisoned").len()
    }

    /// Take the paths recorded since `mark`, leaving earlier entries for
    /// their own bundle to drain.
    pub fn drain_from(&self, mark: usize) -> Vec<PathBuf> {
        let mut paths = self.paths.lock().expect("tracker lock poisoned");
        let at = mark.min(paths.len());
        paths.split_off(at)
    }
}

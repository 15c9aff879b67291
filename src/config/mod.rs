//! Configuration for bpm.
//!
//! Settings merge three layers, later layers winning:
//!
//! 1. Built-in defaults (everything under `~/.bpm/`)
//! 2. The global config file `~/.bpm/config.toml` (override the location
//!    with `BPM_CONFIG_PATH`)
//! 3. Environment variables: `BPM_CACHE_DIR`, `BPM_MANIFEST_DIR`,
//!    `BPM_OFFLINE`, `BPM_WORKERS`
//!
//! CLI flags are applied on top by the command layer.
//!
//! # Config file format
//!
//! ```toml
//! cache_dir = "~/.bpm/cache"
//! manifest_dir = "~/.bpm/manifests"
//! offline = false
//! archive_offline = false
//! workers = 4
//! index = "git::https://github.com/bpm-pkgs/registry.git"
//!
//! [roots]
//! module_dir = "~/.bpm/modules"
//! header_dir = "~/.bpm/include"
//! lib_dir = "~/.bpm/lib"
//! bin_dir = "~/.bpm/bin"
//! ```
//!
//! Paths may use `~` and environment references; they are expanded with
//! `shellexpand` when the file is loaded.

use crate::core::BpmError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Descriptor string of the well-known package index bundle, used to
/// resolve short names when no index is configured.
pub const DEFAULT_INDEX: &str = "git::https://github.com/bpm-pkgs/registry.git";

/// Default number of rule-engine workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Per-install destination roots, exported to build rules as absolute-path
/// environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallRoots {
    /// Root for installed modules
    pub module_dir: PathBuf,
    /// Root for installed headers
    pub header_dir: PathBuf,
    /// Root for installed libraries
    pub lib_dir: PathBuf,
    /// Root for installed executables
    pub bin_dir: PathBuf,
}

impl Default for InstallRoots {
    fn default() -> Self {
        let home = bpm_home();
        Self {
            module_dir: home.join("modules"),
            header_dir: home.join("include"),
            lib_dir: home.join("lib"),
            bin_dir: home.join("bin"),
        }
    }
}

/// Effective runtime settings for one bpm invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the content-addressed bundle cache
    pub cache_dir: PathBuf,
    /// Directory holding one manifest file per installed bundle
    pub manifest_dir: PathBuf,
    /// When set, the VCS transport performs no network access at all
    pub offline: bool,
    /// When set, the archive transport reuses cached extractions and fails
    /// instead of downloading (separate knob from `offline`)
    pub archive_offline: bool,
    /// Worker count passed through opaquely to the rule engine
    pub workers: usize,
    /// Descriptor string of the package index bundle
    pub index: String,
    /// Install destination roots
    pub roots: InstallRoots,
}

/// On-disk shape of `config.toml`; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    cache_dir: Option<String>,
    manifest_dir: Option<String>,
    offline: Option<bool>,
    archive_offline: Option<bool>,
    workers: Option<usize>,
    index: Option<String>,
    #[serde(default)]
    roots: Option<RootsFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RootsFile {
    module_dir: Option<String>,
    header_dir: Option<String>,
    lib_dir: Option<String>,
    bin_dir: Option<String>,
}

/// The bpm home directory (`~/.bpm`), falling back to the current
/// directory when no home directory can be determined.
fn bpm_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".bpm"))
        .unwrap_or_else(|| PathBuf::from(".bpm"))
}

/// Expand `~` and `$VAR` references in a configured path.
fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).map_err(|e| BpmError::ConfigError {
        message: format!("cannot expand path '{raw}': {e}"),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Location of the global config file, honoring `BPM_CONFIG_PATH`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("BPM_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    bpm_home().join("config.toml")
}

impl Settings {
    /// Load settings from the config file and environment.
    pub fn load() -> Result<Self> {
        Self::load_path(&config_path())
    }

    /// Load settings from an explicit config file path. The file may be
    /// absent; environment overrides still apply.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_path(path)
    }

    fn load_path(path: &Path) -> Result<Self> {
        let file = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<ConfigFile>(&text).map_err(|e| BpmError::ConfigError {
                message: format!("invalid config file {}: {e}", path.display()),
            })?
        } else {
            ConfigFile::default()
        };
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let home = bpm_home();

        let cache_dir = match std::env::var("BPM_CACHE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => match &file.cache_dir {
                Some(raw) => expand_path(raw)?,
                None => home.join("cache"),
            },
        };
        let manifest_dir = match std::env::var("BPM_MANIFEST_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => match &file.manifest_dir {
                Some(raw) => expand_path(raw)?,
                None => home.join("manifests"),
            },
        };

        let offline = match std::env::var("BPM_OFFLINE") {
            Ok(value) => matches!(value.as_str(), "1" | "true" | "yes"),
            Err(_) => file.offline.unwrap_or(false),
        };
        let workers = match std::env::var("BPM_WORKERS") {
            Ok(value) => value.parse().map_err(|_| BpmError::ConfigError {
                message: format!("BPM_WORKERS is not a number: '{value}'"),
            })?,
            Err(_) => file.workers.unwrap_or(DEFAULT_WORKERS),
        };

        let defaults = InstallRoots::default();
        let roots = match file.roots {
            Some(roots_file) => InstallRoots {
                module_dir: roots_file
                    .module_dir
                    .as_deref()
                    .map(expand_path)
                    .transpose()?
                    .unwrap_or(defaults.module_dir),
                header_dir: roots_file
                    .header_dir
                    .as_deref()
                    .map(expand_path)
                    .transpose()?
                    .unwrap_or(defaults.header_dir),
                lib_dir: roots_file
                    .lib_dir
                    .as_deref()
                    .map(expand_path)
                    .transpose()?
                    .unwrap_or(defaults.lib_dir),
                bin_dir: roots_file
                    .bin_dir
                    .as_deref()
                    .map(expand_path)
                    .transpose()?
                    .unwrap_or(defaults.bin_dir),
            },
            None => defaults,
        };

        Ok(Self {
            cache_dir,
            manifest_dir,
            offline,
            archive_offline: file.archive_offline.unwrap_or(false),
            workers,
            index: file.index.unwrap_or_else(|| DEFAULT_INDEX.to_string()),
            roots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::from_file(ConfigFile::default()).unwrap();
        assert!(!settings.offline);
        assert!(!settings.archive_offline);
        assert_eq!(settings.workers, DEFAULT_WORKERS);
        assert_eq!(settings.index, DEFAULT_INDEX);
    }

    #[test]
    fn test_config_file_values_win_over_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            offline = true
            workers = 9
            index = "git::https://example.com/index.git"

            [roots]
            bin_dir = "/opt/bpm/bin"
            "#,
        )
        .unwrap();
        let settings = Settings::from_file(file).unwrap();
        assert!(settings.offline);
        assert_eq!(settings.workers, 9);
        assert_eq!(settings.index, "git::https://example.com/index.git");
        assert_eq!(settings.roots.bin_dir, PathBuf::from("/opt/bpm/bin"));
        // Unset roots keep their defaults.
        assert!(settings.roots.lib_dir.ends_with("lib"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        // SAFETY: test is serialized; no other thread reads the env here.
        unsafe {
            std::env::set_var("BPM_CACHE_DIR", "/tmp/bpm-env-cache");
            std::env::set_var("BPM_OFFLINE", "1");
        }
        let file: ConfigFile = toml::from_str("offline = false").unwrap();
        let settings = Settings::from_file(file).unwrap();
        unsafe {
            std::env::remove_var("BPM_CACHE_DIR");
            std::env::remove_var("BPM_OFFLINE");
        }
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/bpm-env-cache"));
        assert!(settings.offline);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<ConfigFile>("no_such_key = 1").is_err());
    }
}

//! Package index for short-name resolution.
//!
//! The index is an ordinary bundle that happens to carry a `registry.toml`
//! file mapping short names to full descriptor strings:
//!
//! ```toml
//! [bundles]
//! zlib = "git::https://example.com/zlib.git"
//! cjson = "archive::https://example.com/cjson-1.7.tar.gz"
//! ```
//!
//! The registry is lazily loaded on first lookup and can be invalidated
//! after the index bundle is (re)installed. The bootstrap loop itself (the
//! single install-and-retry when a name is missing) lives on the installer,
//! which is the only component able to install the index bundle.

use crate::core::BpmError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File carried by the index bundle.
pub const REGISTRY_FILE: &str = "registry.toml";

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    bundles: HashMap<String, String>,
}

/// Lazily-loaded short-name index.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, String>>>,
}

impl Registry {
    /// Create a registry backed by `registry.toml` inside the index
    /// bundle's source directory.
    pub fn new(index_dir: impl AsRef<Path>) -> Self {
        Self {
            path: index_dir.as_ref().join(REGISTRY_FILE),
            entries: Mutex::new(None),
        }
    }

    /// Whether the registry file exists on disk yet.
    pub fn is_present(&self) -> bool {
        self.path.is_file()
    }

    /// Look up a short name, loading the registry file on first use.
    ///
    /// Returns `Ok(None)` when the name is absent or the registry file does
    /// not exist yet; the caller decides whether to bootstrap the index.
    pub fn lookup(&self, name: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        if entries.is_none() {
            if !self.is_present() {
                return Ok(None);
            }
            let text = std::fs::read_to_string(&self.path)
                .with_context(|| format!("reading package index {}", self.path.display()))?;
            let parsed: RegistryFile = toml::from_str(&text).map_err(|e| BpmError::ConfigError {
                message: format!("invalid package index {}: {e}", self.path.display()),
            })?;
            tracing::debug!(
                target: "registry",
                "loaded {} index entries from {}",
                parsed.bundles.len(),
                self.path.display()
            );
            *entries = Some(parsed.bundles);
        }
        Ok(entries.as_ref().and_then(|map| map.get(name).cloned()))
    }

    /// Drop the cached entries so the next lookup re-reads the file.
    /// Called after the index bundle has been installed or updated.
    pub fn invalidate(&self) {
        *self.entries.lock().expect("registry lock poisoned") = None;
    }
}

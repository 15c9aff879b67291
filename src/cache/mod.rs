//! Content-addressed cache of bundle source trees.
//!
//! Every distinct `repo` string maps to exactly one directory under the
//! cache root, reused across installs. The id is derived from the repo
//! string alone, never from the tag: repeated installs with different pins
//! mutate the same working tree (checked out to a different ref) instead of
//! duplicating storage.
//!
//! # Cache layout
//!
//! ```text
//! ~/.bpm/cache/
//!   zlib-1a2b3c4d/          <- {sanitized name}-{8 hex of sha256(repo)}
//!   cjson-99aabbcc/
//! ```
//!
//! The human-readable prefix makes `ls` useful; the hash suffix makes the
//! id collision-resistant across repos whose URLs share a final segment.

use crate::descriptor::bundle_name;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Handle to the cache root directory.
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// Cache at an explicit directory.
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The cache root path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache root if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cache directory {}", self.dir.display()))?;
        Ok(())
    }

    /// Deterministic cache id for a repo string.
    ///
    /// Identical `repo` strings always produce identical ids regardless of
    /// tag; different repos practically never collide thanks to the hash
    /// suffix.
    pub fn entry_id(repo: &str) -> String {
        let digest = Sha256::digest(repo.as_bytes());
        format!("{}-{}", bundle_name(repo), hex::encode(&digest[..4]))
    }

    /// Directory for a repo's cached working tree.
    pub fn entry_dir(&self, repo: &str) -> PathBuf {
        self.dir.join(Self::entry_id(repo))
    }

    /// Remove every cache entry. The next acquisition of each bundle will
    /// re-clone or re-download it.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("reading cache directory {}", self.dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(entry.path())
                    .with_context(|| format!("removing {}", entry.path().display()))?;
                removed += 1;
            }
        }
        tracing::info!(target: "cache", "removed {removed} cache entries");
        Ok(removed)
    }
}

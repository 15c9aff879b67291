//! Bundle acquisition: produce a ready-to-use source tree for a descriptor.
//!
//! `acquire` is the single entry point. Given a normalized descriptor and
//! the cache, it returns a directory guaranteed to contain the bundle's
//! source tree at the state the descriptor pins, using one of two transport
//! strategies:
//!
//! - **VCS** (git): clone into the cache entry when absent, otherwise a
//!   fast-forward-only sync of the pinned ref (failure non-fatal), then an
//!   unconditional hard reset to the ref so repeated acquisition is
//!   idempotent even when local history diverged. Submodules are updated
//!   recursively unless offline.
//! - **Archive**: download (remote) or read in place (local), then extract
//!   with the top-level directory stripped. Archives are never synced
//!   incrementally; every acquisition re-downloads and re-extracts.
//!
//! A descriptor whose repo is an existing local directory is a dev bundle:
//! it is used in place, bypassing the cache entirely.
//!
//! # Offline behavior
//!
//! `offline` guards the VCS strategy: the cache entry must already be a
//! valid working tree ([`BpmError::OfflineCacheMiss`] otherwise) and no
//! network command runs, but the hard reset to the pin still happens.
//! Archives have their own `archive_offline` toggle that reuses a cached
//! extraction instead of downloading.

use crate::archive;
use crate::cache::Cache;
use crate::core::BpmError;
use crate::descriptor::{BundleDescriptor, BundleType};
use crate::git::{GitRepo, ensure_git_available, is_valid_git_repo};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Policy knobs consulted during acquisition.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireOptions {
    /// VCS offline mode: require a cached working tree, no network.
    pub offline: bool,
    /// Archive offline mode: reuse a cached extraction, no download.
    pub archive_offline: bool,
}

/// Result of a successful acquisition.
#[derive(Debug)]
pub struct Acquired {
    /// Directory containing the bundle's source tree at the pinned state.
    pub dir: PathBuf,
    /// Whether this acquisition created the cache entry (fresh clone or
    /// first extraction).
    pub fresh: bool,
    /// SHA-256 of the archive file, for archive bundles only. Stands in
    /// for a commit hash in manifests and lockfiles.
    pub archive_checksum: Option<String>,
}

/// Acquire the source tree for `descriptor`, honoring `options`.
pub async fn acquire(
    descriptor: &BundleDescriptor,
    cache: &Cache,
    options: &AcquireOptions,
) -> Result<Acquired> {
    match descriptor.kind {
        BundleType::Vcs => acquire_vcs(descriptor, cache, options).await,
        BundleType::Archive => acquire_archive(descriptor, cache, options).await,
    }
}

async fn acquire_vcs(
    descriptor: &BundleDescriptor,
    cache: &Cache,
    options: &AcquireOptions,
) -> Result<Acquired> {
    // Dev bundle: a local directory is used in place, never cached. Use a
    // file:// URL to force clone-into-cache behavior for a local repo.
    if descriptor.is_local() {
        let local = Path::new(&descriptor.repo);
        if local.is_dir() {
            tracing::debug!(target: "acquire", "using local bundle in place: {}", descriptor.repo);
            return Ok(Acquired {
                dir: local.to_path_buf(),
                fresh: false,
                archive_checksum: None,
            });
        }
    }

    ensure_git_available()?;
    let entry = cache.entry_dir(&descriptor.repo);

    if options.offline {
        if !is_valid_git_repo(&entry) {
            return Err(BpmError::OfflineCacheMiss {
                repo: descriptor.repo.clone(),
                path: entry.display().to_string(),
            }
            .into());
        }
        let repo = GitRepo::new(&entry);
        let refname = effective_ref(descriptor, &repo).await;
        repo.reset_hard(&refname, &descriptor.repo).await?;
        return Ok(Acquired {
            dir: entry,
            fresh: false,
            archive_checksum: None,
        });
    }

    let fresh = !entry.exists();
    let repo = if fresh {
        cache.ensure_dir()?;
        tracing::info!(target: "acquire", "cloning {}", descriptor.repo);
        GitRepo::clone(&descriptor.repo, &entry).await?
    } else {
        GitRepo::new(&entry)
    };

    let refname = effective_ref(descriptor, &repo).await;
    if !fresh {
        // Non-fatal: the hard reset below makes the tree correct anyway,
        // and the fetch inside sync is what makes the ref reachable.
        repo.sync(&refname).await;
    }
    repo.reset_hard(&refname, &descriptor.repo).await?;
    repo.update_submodules().await?;

    Ok(Acquired {
        dir: entry,
        fresh,
        archive_checksum: None,
    })
}

/// The ref acquisition pins to: the explicit tag, else the remote default
/// branch when it is known, else the conventional default.
async fn effective_ref(descriptor: &BundleDescriptor, repo: &GitRepo) -> String {
    match &descriptor.tag {
        Some(tag) => tag.clone(),
        None => repo
            .default_branch()
            .await
            .unwrap_or_else(|| BundleDescriptor::DEFAULT_BRANCH.to_string()),
    }
}

async fn acquire_archive(
    descriptor: &BundleDescriptor,
    cache: &Cache,
    options: &AcquireOptions,
) -> Result<Acquired> {
    let entry = cache.entry_dir(&descriptor.repo);
    let remote = !descriptor.is_local();

    if remote && options.archive_offline {
        if entry.is_dir() && std::fs::read_dir(&entry)?.next().is_some() {
            tracing::debug!(
                target: "acquire",
                "archive offline: reusing cached extraction at {}",
                entry.display()
            );
            return Ok(Acquired {
                dir: entry,
                fresh: false,
                archive_checksum: None,
            });
        }
        return Err(BpmError::OfflineCacheMiss {
            repo: descriptor.repo.clone(),
            path: entry.display().to_string(),
        }
        .into());
    }

    let fresh = !entry.exists();
    cache.ensure_dir()?;
    std::fs::create_dir_all(&entry)
        .with_context(|| format!("creating cache entry {}", entry.display()))?;

    let archive_path = if remote {
        archive::fetch(&descriptor.repo, &entry).await?
    } else {
        let local = PathBuf::from(&descriptor.repo);
        if !local.is_file() {
            return Err(BpmError::Other {
                message: format!("local archive not found: {}", descriptor.repo),
            }
            .into());
        }
        local
    };

    let checksum = file_sha256(&archive_path).await?;
    archive::extract(&archive_path, &entry).await?;

    Ok(Acquired {
        dir: entry,
        fresh,
        archive_checksum: Some(checksum),
    })
}

/// SHA-256 of a file, hex-encoded. Used as the archive stand-in for a
/// commit hash.
async fn file_sha256(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

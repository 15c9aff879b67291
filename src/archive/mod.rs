//! Archive transport: fetch and extract bundle archives.
//!
//! Archives are the second acquisition strategy next to git. A remote
//! archive URL is downloaded into the bundle's cache entry (with a marker
//! file recording the source URL for provenance); a local path is read in
//! place. Extraction strips the top-level directory component so the cache
//! entry directly contains the project root, matching what a git clone of
//! the same project would look like.
//!
//! Archives are never incrementally synced: every acquisition re-downloads
//! and re-extracts. The format is chosen purely by filename suffix:
//! `.zip`, `.tar.gz`/`.tgz`, or plain `.tar`.

use crate::core::BpmError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Marker file written next to a downloaded archive, recording where it
/// came from.
pub const SOURCE_MARKER: &str = ".bpm-source-url";

/// Archive format, selected by filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.zip`
    Zip,
    /// `.tar.gz` or `.tgz`
    TarGz,
    /// plain `.tar`
    Tar,
}

impl ArchiveKind {
    /// Determine the archive kind from a filename, or fail with
    /// [`BpmError::UnsupportedArchive`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else {
            Err(BpmError::UnsupportedArchive {
                path: path.display().to_string(),
            }
            .into())
        }
    }
}

/// Download `url` into `dest_dir`, returning the local archive path.
///
/// The filename is taken from the last URL segment. A [`SOURCE_MARKER`]
/// file recording `url` is written next to the archive.
pub async fn fetch(url: &str, dest_dir: &Path) -> Result<PathBuf> {
    let filename = url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("bundle-archive");
    let target = dest_dir.join(filename);

    tracing::info!(target: "archive", "downloading {url}");
    let response = reqwest::get(url).await.map_err(|e| BpmError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !response.status().is_success() {
        return Err(BpmError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP status {}", response.status()),
        }
        .into());
    }
    let bytes = response.bytes().await.map_err(|e| BpmError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("writing archive to {}", target.display()))?;
    tokio::fs::write(dest_dir.join(SOURCE_MARKER), url)
        .await
        .with_context(|| format!("writing source marker in {}", dest_dir.display()))?;

    tracing::debug!(target: "archive", "saved {} bytes to {}", bytes.len(), target.display());
    Ok(target)
}

/// Extract `archive` into `dest_dir`, stripping the top-level directory
/// component of every entry.
///
/// Runs on the blocking thread pool; archive readers are synchronous.
pub async fn extract(archive: &Path, dest_dir: &Path) -> Result<()> {
    let kind = ArchiveKind::from_path(archive)?;
    let archive = archive.to_path_buf();
    let dest = dest_dir.to_path_buf();
    tracing::info!(target: "archive", "extracting {} into {}", archive.display(), dest.display());

    tokio::task::spawn_blocking(move || extract_blocking(kind, &archive, &dest))
        .await
        .context("archive extraction task panicked")?
}

fn extract_blocking(kind: ArchiveKind, archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("creating extraction directory {}", dest.display()))?;
    match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::TarGz => {
            let file = open_archive(archive)?;
            extract_tar(flate2::read::GzDecoder::new(file), archive, dest)
        }
        ArchiveKind::Tar => {
            let file = open_archive(archive)?;
            extract_tar(file, archive, dest)
        }
    }
}

fn open_archive(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("opening archive {}", path.display()))
}

fn extract_tar<R: Read>(reader: R, archive: &Path, dest: &Path) -> Result<()> {
    let mut tar = tar::Archive::new(reader);
    for entry in tar.entries().map_err(|e| extract_err(archive, &e))? {
        let mut entry = entry.map_err(|e| extract_err(archive, &e))?;
        let path = entry.path().map_err(|e| extract_err(archive, &e))?;
        let Some(stripped) = strip_top_level(&path) else {
            continue; // the top-level directory itself
        };
        let target = dest.join(stripped);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .map_err(|e| extract_err(archive, &e))?;
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = open_archive(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| extract_err(archive, &e))?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| extract_err(archive, &e))?;
        let Some(enclosed) = entry.enclosed_name() else {
            continue; // refuses entries that escape the destination
        };
        let Some(stripped) = strip_top_level(&enclosed) else {
            continue;
        };
        let target = dest.join(stripped);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("creating {}", target.display()))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| extract_err(archive, &e))?;
    }
    Ok(())
}

/// Drop the first path component; `None` when nothing remains.
fn strip_top_level(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    components.next()?;
    let rest = components.as_path();
    if rest.as_os_str().is_empty() {
        None
    } else {
        Some(rest.to_path_buf())
    }
}

fn extract_err(archive: &Path, err: &dyn std::fmt::Display) -> BpmError {
    BpmError::ExtractFailed {
        path: archive.display().to_string(),
        reason: err.to_string(),
    }
}

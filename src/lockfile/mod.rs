//! Lockfile generation, parsing and ordering.
//!
//! The lockfile is an ordered snapshot of every installed, pinned bundle,
//! replayable to reproduce the exact installed dependency graph. Ordering
//! is the load-bearing part: every entry appears after all entries it
//! depends on, so replaying the file top to bottom installs dependencies
//! before their dependents.
//!
//! # Format
//!
//! A literal JSON sequence, one record per line for line-oriented diffing:
//!
//! ```text
//! [
//! {"repo":"https://example.com/a.git","sha":"1111..."},
//! {"repo":"https://example.com/b.tar.gz","sha":"2222...","type":"archive"}
//! ]
//! ```
//!
//! Each bundle's line is stable across regenerations unless its pin or
//! dependency set changes. The `type` key is carried only when it differs
//! from the default (VCS).
//!
//! # Ordering algorithm
//!
//! Repeated-pass selection over the installed manifests: a bundle becomes
//! eligible once every one of its dependency identifiers has been placed;
//! full passes repeat until all bundles are placed or a pass places none,
//! which is a fatal [`BpmError::UnresolvableOrder`] naming every unplaced
//! repo (a cycle, or a dependency that is not installed). Bundles becoming
//! eligible in the same pass are ordered lexicographically by repo so
//! regenerated lockfiles are reproducible regardless of directory
//! enumeration order.
//!
//! At load time, file order is authoritative: the loader never re-sorts. A
//! hand-edited lockfile out of dependency order will install dependents
//! first; keeping the file well-ordered is the caller's responsibility.

use crate::core::BpmError;
use crate::descriptor::{BundleDescriptor, BundleType, RawDependency};
use crate::manifest::ManifestStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default lockfile name.
pub const LOCKFILE_NAME: &str = "bpm.lock";

/// One pinned bundle in the lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Repository URL or archive location.
    pub repo: String,
    /// Commit hash (VCS) or archive checksum.
    pub sha: String,
    /// Transport type; omitted when VCS.
    #[serde(
        default,
        rename = "type",
        skip_serializing_if = "BundleType::is_default"
    )]
    pub kind: BundleType,
}

impl LockEntry {
    /// Descriptor to replay this entry with. VCS entries pin the recorded
    /// commit as the tag; archive checksums are not refs, so archives
    /// replay unpinned (the URL itself names the exact content).
    pub fn to_descriptor(&self) -> BundleDescriptor {
        match self.kind {
            BundleType::Vcs => BundleDescriptor {
                repo: self.repo.clone(),
                tag: Some(self.sha.clone()),
                kind: BundleType::Vcs,
            },
            BundleType::Archive => BundleDescriptor {
                repo: self.repo.clone(),
                tag: None,
                kind: BundleType::Archive,
            },
        }
    }
}

/// An ordered sequence of lock entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockFile {
    /// Entries in dependency-respecting order.
    pub entries: Vec<LockEntry>,
}

impl LockFile {
    /// Build a dependency-respecting total order over the installed
    /// manifests in `store`.
    ///
    /// Manifests lacking both `repo` and `sha` (local/dev bundles) are
    /// skipped with a notice. Duplicate repos keep one representative
    /// entry.
    pub fn build(store: &ManifestStore) -> Result<Self> {
        struct Node {
            repo: String,
            sha: String,
            kind: BundleType,
            deps: Vec<String>,
        }

        let mut nodes: Vec<Node> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (name, manifest) in store.load_all()? {
            if !manifest.is_pinned() {
                tracing::info!(
                    target: "lockfile",
                    "skipping local bundle '{name}' (no repo/sha)"
                );
                continue;
            }
            let repo = manifest.repo.clone().unwrap_or_default();
            if !seen.insert(repo.clone()) {
                continue;
            }
            // Manifests store bare repo strings; the transport type is
            // recovered from the archive filename suffix.
            let kind = if looks_like_archive(&repo) {
                BundleType::Archive
            } else {
                BundleType::Vcs
            };
            nodes.push(Node {
                repo,
                sha: manifest.sha.clone().unwrap_or_default(),
                kind,
                deps: manifest.dependencies.iter().map(RawDependency::repo_id).collect(),
            });
        }

        // Lexicographic base order makes the same-pass tie-break canonical.
        nodes.sort_by(|a, b| a.repo.cmp(&b.repo));

        let mut entries = Vec::with_capacity(nodes.len());
        let mut placed: HashSet<String> = HashSet::new();
        while !nodes.is_empty() {
            let mut placed_this_pass = Vec::new();
            let mut still_remaining = Vec::new();
            for node in nodes {
                if node.deps.iter().all(|dep| placed.contains(dep)) {
                    placed_this_pass.push(node);
                } else {
                    still_remaining.push(node);
                }
            }
            if placed_this_pass.is_empty() {
                let repos: Vec<String> =
                    still_remaining.into_iter().map(|n| n.repo).collect();
                return Err(BpmError::UnresolvableOrder { repos }.into());
            }
            for node in placed_this_pass {
                placed.insert(node.repo.clone());
                entries.push(LockEntry {
                    repo: node.repo,
                    sha: node.sha,
                    kind: node.kind,
                });
            }
            nodes = still_remaining;
        }

        Ok(Self { entries })
    }

    /// Serialize to the line-oriented JSON sequence.
    pub fn serialize(&self) -> String {
        let mut out = String::from("[\n");
        for (i, entry) in self.entries.iter().enumerate() {
            // LockEntry serialization cannot fail: plain strings only.
            out.push_str(&serde_json::to_string(entry).expect("lock entry serializes"));
            if i + 1 < self.entries.len() {
                out.push(',');
            }
            out.push('\n');
        }
        out.push_str("]\n");
        out
    }

    /// Parse a serialized lockfile, preserving file order exactly.
    pub fn parse(text: &str) -> Result<Self> {
        let entries: Vec<LockEntry> =
            serde_json::from_str(text).map_err(BpmError::from)?;
        Ok(Self { entries })
    }

    /// Write the lockfile to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.serialize())
            .with_context(|| format!("writing lockfile {}", path.display()))?;
        tracing::info!(
            target: "lockfile",
            "wrote {} entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Read and parse the lockfile at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading lockfile {}", path.display()))?;
        Self::parse(&text)
    }
}

/// Archive repos are recognizable by their filename suffix; everything
/// else in a manifest is a VCS repo.
fn looks_like_archive(repo: &str) -> bool {
    let lower = repo.to_ascii_lowercase();
    lower.ends_with(".zip")
        || lower.ends_with(".tar.gz")
        || lower.ends_with(".tgz")
        || lower.ends_with(".tar")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RawDependency;
    use crate::manifest::InstalledManifest;
    use tempfile::TempDir;

    fn store_with(manifests: &[(&str, &str, &str, &[&str])]) -> (TempDir, ManifestStore) {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        for (name, repo, sha, deps) in manifests {
            store
                .save(
                    name,
                    &InstalledManifest {
                        repo: Some((*repo).to_string()),
                        sha: Some((*sha).to_string()),
                        dependencies: deps
                            .iter()
                            .map(|d| RawDependency::Reference((*d).to_string()))
                            .collect(),
                        paths: Vec::new(),
                    },
                )
                .unwrap();
        }
        (dir, store)
    }

    fn repos(lock: &LockFile) -> Vec<&str> {
        lock.entries.iter().map(|e| e.repo.as_str()).collect()
    }

    #[test]
    fn test_dependency_comes_first() {
        // B depends on A: order must be [A, B] regardless of enumeration.
        let (_dir, store) = store_with(&[
            ("b", "B", "2", &["A"]),
            ("a", "A", "1", &[]),
        ]);
        let lock = LockFile::build(&store).unwrap();
        assert_eq!(repos(&lock), ["A", "B"]);
    }

    #[test]
    fn test_dependencies_ordered_before_dependents() {
        let (_dir, store) = store_with(&[
            ("c", "C", "3", &["B"]),
            ("a", "A", "1", &[]),
            ("b", "B", "2", &["A"]),
            ("d", "D", "4", &["A", "C"]),
        ]);
        let lock = LockFile::build(&store).unwrap();
        let order = repos(&lock);
        let pos = |r: &str| order.iter().position(|x| *x == r).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("C"));
        assert!(pos("A") < pos("D"));
        assert!(pos("C") < pos("D"));
    }

    #[test]
    fn test_same_pass_tie_break_is_lexicographic() {
        let (_dir, store) = store_with(&[
            ("z", "Z", "1", &[]),
            ("m", "M", "2", &[]),
            ("a", "A", "3", &[]),
        ]);
        let lock = LockFile::build(&store).unwrap();
        assert_eq!(repos(&lock), ["A", "M", "Z"]);
    }

    #[test]
    fn test_cycle_names_both_repos() {
        let (_dir, store) = store_with(&[
            ("a", "A", "1", &["B"]),
            ("b", "B", "2", &["A"]),
        ]);
        let err = LockFile::build(&store).unwrap_err();
        match err.downcast_ref::<BpmError>() {
            Some(BpmError::UnresolvableOrder { repos }) => {
                assert!(repos.contains(&"A".to_string()));
                assert!(repos.contains(&"B".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dependency_is_unresolvable() {
        let (_dir, store) = store_with(&[("a", "A", "1", &["NotInstalled"])]);
        let err = LockFile::build(&store).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BpmError>(),
            Some(BpmError::UnresolvableOrder { repos }) if repos == &["A".to_string()]
        ));
    }

    #[test]
    fn test_local_bundles_excluded() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        store
            .save("dev", &InstalledManifest::default())
            .unwrap();
        store
            .save(
                "a",
                &InstalledManifest {
                    repo: Some("A".to_string()),
                    sha: Some("1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let lock = LockFile::build(&store).unwrap();
        assert_eq!(repos(&lock), ["A"]);
    }

    #[test]
    fn test_serialize_one_record_per_line() {
        let lock = LockFile {
            entries: vec![
                LockEntry {
                    repo: "A".to_string(),
                    sha: "1".to_string(),
                    kind: BundleType::Vcs,
                },
                LockEntry {
                    repo: "B.tar.gz".to_string(),
                    sha: "2".to_string(),
                    kind: BundleType::Archive,
                },
            ],
        };
        let text = lock.serialize();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"["));
        assert_eq!(lines.last(), Some(&"]"));
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("\"repo\":\"A\""));
        assert!(!lines[1].contains("type"));
        assert!(lines[2].contains("\"type\":\"archive\""));
    }

    #[test]
    fn test_serialize_parse_round_trip_preserves_order() {
        let lock = LockFile {
            entries: vec![
                LockEntry {
                    repo: "B".to_string(),
                    sha: "2".to_string(),
                    kind: BundleType::Vcs,
                },
                LockEntry {
                    repo: "A".to_string(),
                    sha: "1".to_string(),
                    kind: BundleType::Vcs,
                },
            ],
        };
        // Deliberately "wrong" order: parse must preserve it verbatim.
        let parsed = LockFile::parse(&lock.serialize()).unwrap();
        assert_eq!(parsed, lock);
    }

    #[test]
    fn test_vcs_entry_replays_pinned_to_sha() {
        let entry = LockEntry {
            repo: "https://a.git".to_string(),
            sha: "abc123".to_string(),
            kind: BundleType::Vcs,
        };
        let desc = entry.to_descriptor();
        assert_eq!(desc.tag.as_deref(), Some("abc123"));
        assert_eq!(desc.kind, BundleType::Vcs);
    }

    #[test]
    fn test_archive_detection_from_suffix() {
        let (_dir, store) = store_with(&[(
            "pkg",
            "https://example.com/pkg-1.0.tar.gz",
            "deadbeef",
            &[],
        )]);
        let lock = LockFile::build(&store).unwrap();
        assert_eq!(lock.entries[0].kind, BundleType::Archive);
    }
}

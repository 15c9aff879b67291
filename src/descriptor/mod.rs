//! Bundle descriptor parsing and normalization.
//!
//! A *bundle* is identified by a descriptor: a repository location (URL or
//! filesystem path), an optional version pin (branch, tag or commit), and a
//! transport type (version-controlled or archive). Raw references arrive in
//! three shapes and are normalized here:
//!
//! - **Full string**: up to three `::`-separated parts, assigned by count:
//!   `repo`, `type::repo` or `type::repo::tag`. Any other part count is a
//!   [`BpmError::MalformedDescriptor`].
//! - **Record**: a manifest dependency entry with a mandatory `repo` field
//!   and optional `tag`/`type`, passed through unchanged.
//! - **Short name**: an alias with no scheme or path separator, resolved
//!   through the package index (see [`Registry`]). Index entries map
//!   directly to full descriptor strings, so resolution never recurses
//!   through a second short name.
//!
//! Two descriptors identify the *same bundle* iff their `repo` strings are
//! equal; the tag may change across installs (re-pinning) without changing
//! bundle identity or its cache location.
//!
//! # Examples
//!
//! ```rust
//! use bpm_cli::descriptor::{BundleDescriptor, BundleType, ParsedRef};
//!
//! let parsed = BundleDescriptor::parse("git::https://example.com/x.git::v1.0").unwrap();
//! let ParsedRef::Descriptor(desc) = parsed else { panic!() };
//! assert_eq!(desc.repo, "https://example.com/x.git");
//! assert_eq!(desc.tag.as_deref(), Some("v1.0"));
//! assert_eq!(desc.kind, BundleType::Vcs);
//! ```

mod registry;

pub use registry::Registry;

use crate::core::BpmError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Separator between the parts of a full descriptor string.
pub const PART_SEPARATOR: &str = "::";

/// Transport strategy for acquiring a bundle's source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleType {
    /// Version-controlled repository, cloned and synced with git.
    #[default]
    Vcs,
    /// Archive fetched (or read locally) and extracted. The `tag` field is
    /// ignored for archives.
    Archive,
}

impl BundleType {
    /// Parse a type token from a descriptor string.
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "git" | "vcs" => Some(Self::Vcs),
            "archive" | "tar" | "zip" => Some(Self::Archive),
            _ => None,
        }
    }

    /// Token used when re-deriving a descriptor string.
    pub fn token(self) -> &'static str {
        match self {
            Self::Vcs => "git",
            Self::Archive => "archive",
        }
    }

    /// True for the default (VCS) type; used to skip the `type` key when
    /// serializing lock entries.
    pub fn is_default(&self) -> bool {
        *self == Self::Vcs
    }
}

/// A normalized bundle descriptor. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Repository URL or filesystem path.
    pub repo: String,
    /// Branch, tag or commit pin. `None` means the VCS default branch;
    /// ignored entirely for archives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Transport type, defaulting to VCS.
    #[serde(default, rename = "type", skip_serializing_if = "BundleType::is_default")]
    pub kind: BundleType,
}

/// Outcome of parsing a raw reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRef {
    /// A complete descriptor.
    Descriptor(BundleDescriptor),
    /// A short name that must be resolved through the package index.
    ShortName(String),
}

/// A dependency entry as it appears in manifests and build descriptions:
/// either a bare descriptor string or a full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDependency {
    /// `"git::https://example.com/x.git::v1.0"` or a short name.
    Reference(String),
    /// `{ repo = "...", tag = "...", type = "git" }`.
    Record(BundleDescriptor),
}

impl RawDependency {
    /// The bare repo identifier used for lockfile ordering. Parses string
    /// forms when possible; short names and unparseable strings are used
    /// verbatim.
    pub fn repo_id(&self) -> String {
        match self {
            Self::Record(desc) => desc.repo.clone(),
            Self::Reference(raw) => match BundleDescriptor::parse(raw) {
                Ok(ParsedRef::Descriptor(desc)) => desc.repo,
                _ => raw.clone(),
            },
        }
    }
}

impl BundleDescriptor {
    /// Create a descriptor for a plain VCS repo with no pin.
    pub fn vcs(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            tag: None,
            kind: BundleType::Vcs,
        }
    }

    /// Parse a raw reference string into a descriptor or a short name.
    ///
    /// Splitting on `::` yields 1, 2 or 3 parts: `repo`, `type::repo`, or
    /// `type::repo::tag`. A single part with no scheme or path separator is
    /// a short name. Any other shape fails with
    /// [`BpmError::MalformedDescriptor`] carrying the raw value.
    pub fn parse(raw: &str) -> Result<ParsedRef> {
        let parts: Vec<&str> = raw.split(PART_SEPARATOR).collect();
        match parts.as_slice() {
            [repo] => {
                if is_short_name(repo) {
                    Ok(ParsedRef::ShortName((*repo).to_string()))
                } else {
                    Ok(ParsedRef::Descriptor(Self::vcs(*repo)))
                }
            }
            [kind, repo] => {
                let kind = BundleType::from_token(kind).ok_or_else(|| {
                    BpmError::MalformedDescriptor {
                        raw: raw.to_string(),
                    }
                })?;
                Ok(ParsedRef::Descriptor(Self {
                    repo: (*repo).to_string(),
                    tag: None,
                    kind,
                }))
            }
            [kind, repo, tag] => {
                let kind = BundleType::from_token(kind).ok_or_else(|| {
                    BpmError::MalformedDescriptor {
                        raw: raw.to_string(),
                    }
                })?;
                Ok(ParsedRef::Descriptor(Self {
                    repo: (*repo).to_string(),
                    tag: Some((*tag).to_string()),
                    kind,
                }))
            }
            _ => Err(BpmError::MalformedDescriptor {
                raw: raw.to_string(),
            }
            .into()),
        }
    }

    /// Parse a raw reference that must be a full descriptor (not a short
    /// name), e.g. the configured index bundle reference.
    pub fn parse_full(raw: &str) -> Result<Self> {
        match Self::parse(raw)? {
            ParsedRef::Descriptor(desc) => Ok(desc),
            ParsedRef::ShortName(_) => Err(BpmError::MalformedDescriptor {
                raw: raw.to_string(),
            }
            .into()),
        }
    }

    /// The pin to use for VCS acquisition when none was given.
    pub const DEFAULT_BRANCH: &'static str = "master";

    /// The effective tag: the explicit pin, or the VCS default branch.
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(Self::DEFAULT_BRANCH)
    }

    /// Re-derive the N-part descriptor string this descriptor came from.
    ///
    /// One part when the type and tag are both defaulted, two parts with an
    /// explicit type, three with an explicit tag.
    pub fn to_descriptor_string(&self) -> String {
        match (&self.tag, self.kind) {
            (Some(tag), kind) => format!(
                "{}{PART_SEPARATOR}{}{PART_SEPARATOR}{tag}",
                kind.token(),
                self.repo
            ),
            (None, BundleType::Vcs) => self.repo.clone(),
            (None, kind) => format!("{}{PART_SEPARATOR}{}", kind.token(), self.repo),
        }
    }

    /// True when `repo` is a local filesystem path rather than a remote URL.
    pub fn is_local(&self) -> bool {
        !is_remote_url(&self.repo)
    }
}

/// True when the string denotes a remote location (has a URL scheme or is
/// scp-style `user@host:path`).
pub fn is_remote_url(repo: &str) -> bool {
    repo.contains("://") || (repo.contains('@') && repo.contains(':'))
}

/// A short name has no scheme separator, no path separator and no `@`:
/// nothing that could address a repository directly.
fn is_short_name(raw: &str) -> bool {
    !raw.is_empty()
        && !raw.contains("://")
        && !raw.contains('/')
        && !raw.contains('\\')
        && !raw.contains('@')
        && !raw.contains(':')
        && !raw.starts_with('.')
}

/// Derive a bundle name from its repo string: the last path segment with
/// any `.git` suffix removed. Used for manifest filenames and log output.
pub fn bundle_name(repo: &str) -> String {
    let trimmed = repo.trim_end_matches('/');
    let tail = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches(".git");
    let name: String = tail
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "bundle".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(raw: &str) -> BundleDescriptor {
        match BundleDescriptor::parse(raw).unwrap() {
            ParsedRef::Descriptor(d) => d,
            ParsedRef::ShortName(name) => panic!("unexpected short name: {name}"),
        }
    }

    #[test]
    fn test_parse_one_part() {
        let desc = descriptor("https://example.com/x.git");
        assert_eq!(desc.repo, "https://example.com/x.git");
        assert_eq!(desc.tag, None);
        assert_eq!(desc.kind, BundleType::Vcs);
    }

    #[test]
    fn test_parse_two_parts() {
        let desc = descriptor("archive::https://example.com/x.tar.gz");
        assert_eq!(desc.kind, BundleType::Archive);
        assert_eq!(desc.repo, "https://example.com/x.tar.gz");
    }

    #[test]
    fn test_parse_three_parts() {
        let desc = descriptor("git::https://example.com/x.git::v1.0");
        assert_eq!(desc.repo, "https://example.com/x.git");
        assert_eq!(desc.tag.as_deref(), Some("v1.0"));
        assert_eq!(desc.kind, BundleType::Vcs);
    }

    #[test]
    fn test_parse_four_parts_is_malformed() {
        let err = BundleDescriptor::parse("git::https://a::v1::extra").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("git::https://a::v1::extra"), "got: {msg}");
    }

    #[test]
    fn test_parse_unknown_type_is_malformed() {
        assert!(BundleDescriptor::parse("svn::https://example.com/x").is_err());
    }

    #[test]
    fn test_short_name_detection() {
        assert_eq!(
            BundleDescriptor::parse("zlib").unwrap(),
            ParsedRef::ShortName("zlib".to_string())
        );
        // Anything path-like or remote-like is a repo, not a short name.
        assert!(matches!(
            BundleDescriptor::parse("./local/dir").unwrap(),
            ParsedRef::Descriptor(_)
        ));
        assert!(matches!(
            BundleDescriptor::parse("git@github.com:user/repo.git").unwrap(),
            ParsedRef::Descriptor(_)
        ));
    }

    #[test]
    fn test_descriptor_string_round_trip() {
        for raw in [
            "https://example.com/x.git",
            "archive::https://example.com/x.tar.gz",
            "git::https://example.com/x.git::v1.0",
            "archive::https://example.com/x.zip::ignored",
        ] {
            assert_eq!(descriptor(raw).to_descriptor_string(), raw);
        }
    }

    #[test]
    fn test_tag_default() {
        let desc = descriptor("https://example.com/x.git");
        assert_eq!(desc.tag_or_default(), "master");
        let pinned = descriptor("git::https://example.com/x.git::v2");
        assert_eq!(pinned.tag_or_default(), "v2");
    }

    #[test]
    fn test_raw_dependency_repo_id() {
        let by_string = RawDependency::Reference("git::https://a.git::v1".to_string());
        assert_eq!(by_string.repo_id(), "https://a.git");
        let by_record = RawDependency::Record(BundleDescriptor::vcs("https://b.git"));
        assert_eq!(by_record.repo_id(), "https://b.git");
        let short = RawDependency::Reference("zlib".to_string());
        assert_eq!(short.repo_id(), "zlib");
    }

    #[test]
    fn test_bundle_name_from_repo() {
        assert_eq!(bundle_name("https://example.com/proj/x.git"), "x");
        assert_eq!(bundle_name("git@github.com:user/repo.git"), "repo");
        assert_eq!(bundle_name("/home/dev/mylib/"), "mylib");
    }

    #[test]
    fn test_is_local() {
        assert!(BundleDescriptor::vcs("/home/dev/mylib").is_local());
        assert!(!BundleDescriptor::vcs("https://example.com/x.git").is_local());
        assert!(!BundleDescriptor::vcs("git@github.com:u/r.git").is_local());
    }

    #[test]
    fn test_record_dependency_deserialization() {
        let dep: RawDependency =
            toml::from_str::<std::collections::HashMap<String, RawDependency>>(
                "a = { repo = \"https://x.git\", tag = \"v1\" }",
            )
            .unwrap()
            .remove("a")
            .unwrap();
        match dep {
            RawDependency::Record(desc) => {
                assert_eq!(desc.repo, "https://x.git");
                assert_eq!(desc.tag.as_deref(), Some("v1"));
            }
            RawDependency::Reference(_) => panic!("expected record form"),
        }
    }
}

//! Error handling for bpm
//!
//! The error system is built around two types:
//! - [`BpmError`] - strongly-typed failure cases for every operation in bpm
//! - [`ErrorContext`] - wrapper adding a user-facing message and an optional
//!   suggestion, used by the CLI to render actionable errors
//!
//! # Error Categories
//!
//! - **Descriptors**: [`BpmError::MalformedDescriptor`], [`BpmError::BundleNotFound`]
//! - **Acquisition**: [`BpmError::OfflineCacheMiss`], [`BpmError::RefNotFound`],
//!   [`BpmError::GitCloneFailed`], [`BpmError::DownloadFailed`],
//!   [`BpmError::UnsupportedArchive`]
//! - **State**: [`BpmError::ManifestNotFound`], [`BpmError::ManifestConflict`],
//!   [`BpmError::UnresolvableOrder`]
//! - **Carriers**: [`BpmError::IoError`], [`BpmError::TomlError`],
//!   [`BpmError::JsonError`]
//!
//! Every failure aborts the whole operation and propagates to the top-level
//! caller; the only retried operation in the crate is the one-shot package
//! index re-resolution after installing the index bundle. Use
//! [`user_friendly_error`] at the CLI boundary to convert any `anyhow::Error`
//! into a displayable [`ErrorContext`].

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for bpm operations.
///
/// Each variant represents a specific failure mode and carries enough
/// context (repo URLs, refs, paths) to produce a message the user can act
/// on without reading the source.
#[derive(Error, Debug)]
pub enum BpmError {
    /// A bundle reference string could not be parsed into a descriptor.
    ///
    /// Raised when a `::`-separated reference has more than three parts or
    /// names an unknown bundle type. The offending raw value is included so
    /// the user can see exactly what failed to parse.
    #[error("malformed bundle descriptor: '{raw}'")]
    MalformedDescriptor {
        /// The raw reference string as supplied by the caller
        raw: String,
    },

    /// A short name was not found in the package index.
    ///
    /// Raised after the index bundle has been installed and the lookup
    /// retried exactly once.
    #[error("bundle '{name}' not found in package index")]
    BundleNotFound {
        /// The short name that failed to resolve
        name: String,
    },

    /// Offline mode requires a cache entry that does not exist.
    ///
    /// No network fallback is attempted; the user must either populate the
    /// cache or disable offline mode.
    #[error("offline mode: no cached copy of '{repo}' at {path}")]
    OfflineCacheMiss {
        /// Repository URL of the missing bundle
        repo: String,
        /// Cache directory that was expected to hold the working tree
        path: String,
    },

    /// The pinned tag/branch/commit is unreachable after a sync.
    #[error("ref '{reference}' not found in repository '{repo}'")]
    RefNotFound {
        /// The unreachable git reference
        reference: String,
        /// Repository the reference was looked up in
        repo: String,
        /// Stderr from the failing git command
        reason: String,
    },

    /// The installed manifests contain a cycle or a dependency that is not
    /// itself installed; no dependency-respecting order exists.
    #[error("cannot order installed bundles: unresolved {}", repos.join(", "))]
    UnresolvableOrder {
        /// Every repo that could not be placed in the order
        repos: Vec<String>,
    },

    /// Uninstall target was never installed (no manifest on disk).
    #[error("no installed manifest for bundle '{name}'")]
    ManifestNotFound {
        /// The bundle name that has no manifest
        name: String,
    },

    /// Two different repositories resolve to the same bundle name; the
    /// first install's record is kept rather than silently overwritten.
    #[error("bundle name collision: '{name}' is already installed from {existing}")]
    ManifestConflict {
        /// The colliding bundle name
        name: String,
        /// Repository recorded by the existing manifest
        existing: String,
        /// Repository of the install being refused
        incoming: String,
    },

    /// Git is not installed or not found in PATH.
    #[error("git is not installed or not found in PATH")]
    GitNotFound,

    /// A git command exited unsuccessfully.
    #[error("git operation failed: {operation}")]
    GitCommandError {
        /// The git subcommand that failed (e.g. "fetch")
        operation: String,
        /// Stderr captured from the git process
        stderr: String,
    },

    /// Cloning a repository failed.
    #[error("failed to clone repository: {url}")]
    GitCloneFailed {
        /// The clone URL
        url: String,
        /// Stderr captured from the git process
        reason: String,
    },

    /// Downloading a remote archive failed.
    #[error("failed to download archive: {url}")]
    DownloadFailed {
        /// The archive URL
        url: String,
        /// Transport-level failure description
        reason: String,
    },

    /// An archive filename has no recognized suffix.
    #[error("unsupported archive format: {path}")]
    UnsupportedArchive {
        /// The archive path whose suffix was not recognized
        path: String,
    },

    /// Extracting an archive failed.
    #[error("failed to extract archive {path}: {reason}")]
    ExtractFailed {
        /// The archive being extracted
        path: String,
        /// Failure description from the archive reader
        reason: String,
    },

    /// Configuration file problems (bad TOML, missing home directory, ...).
    #[error("configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// The bundle source directory has no build description file.
    #[error("no build description found at {path}")]
    BuildDescriptionNotFound {
        /// Expected location of the build description
        path: String,
    },

    /// IO error wrapper for automatic conversion.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error wrapper.
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error wrapper.
    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// JSON error wrapper (lockfile codec).
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error with a custom message.
    #[error("{message}")]
    Other {
        /// The error message
        message: String,
    },
}

/// A user-facing error wrapper with an optional suggestion and details.
///
/// Produced by [`user_friendly_error`] at the CLI boundary. `display()`
/// renders the error with colors; `Display` renders it plainly for logs.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub message: String,
    /// An actionable suggestion for the user, if one is known
    pub suggestion: Option<String>,
    /// Extra details (stderr excerpts, paths) worth surfacing
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error message with no suggestion.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Attach an actionable suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach extra details (e.g. captured stderr).
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.message);
        if let Some(details) = &self.details {
            eprintln!("  {}", details.dimmed());
        }
        if let Some(suggestion) = &self.suggestion {
            eprintln!("{} {}", "hint:".yellow().bold(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(details) = &self.details {
            write!(f, "\n  {details}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nhint: {suggestion}")?;
        }
        Ok(())
    }
}

/// Convert any error into a user-friendly [`ErrorContext`] with a suggestion
/// appropriate to the failure, falling back to the plain message chain.
pub fn user_friendly_error(err: anyhow::Error) -> ErrorContext {
    if let Some(bpm_err) = err.downcast_ref::<BpmError>() {
        return match bpm_err {
            BpmError::MalformedDescriptor { .. } => ErrorContext::new(bpm_err.to_string())
                .with_suggestion(
                    "descriptors are 'repo', 'type::repo' or 'type::repo::tag' \
                     where type is 'git' or 'archive'",
                ),
            BpmError::BundleNotFound { name } => {
                ErrorContext::new(bpm_err.to_string()).with_suggestion(format!(
                    "check that '{name}' exists in the package index, or pass a full repository URL"
                ))
            }
            BpmError::OfflineCacheMiss { .. } => ErrorContext::new(bpm_err.to_string())
                .with_suggestion("run once without --offline to populate the cache"),
            BpmError::RefNotFound { reference, .. } => ErrorContext::new(bpm_err.to_string())
                .with_suggestion(format!(
                    "verify that '{reference}' is a branch, tag or commit in the repository"
                )),
            BpmError::UnresolvableOrder { .. } => {
                ErrorContext::new(bpm_err.to_string()).with_suggestion(
                    "the installed bundles contain a dependency cycle or depend on a bundle \
                     that is not installed",
                )
            }
            BpmError::ManifestNotFound { .. } => ErrorContext::new(bpm_err.to_string())
                .with_suggestion("use 'bpm lock' output to see installed bundles"),
            BpmError::ManifestConflict { name, incoming, .. } => {
                ErrorContext::new(bpm_err.to_string()).with_suggestion(format!(
                    "uninstall '{name}' first if you intend to replace it with {incoming}"
                ))
            }
            BpmError::GitNotFound => ErrorContext::new(bpm_err.to_string())
                .with_suggestion("install git and make sure it is in your PATH"),
            BpmError::GitCloneFailed { reason, .. }
            | BpmError::GitCommandError {
                stderr: reason, ..
            } => ErrorContext::new(bpm_err.to_string()).with_details(reason.trim().to_string()),
            BpmError::DownloadFailed { reason, .. } => {
                ErrorContext::new(bpm_err.to_string()).with_details(reason.clone())
            }
            _ => ErrorContext::new(bpm_err.to_string()),
        };
    }

    // Fall back to the anyhow chain: top message plus the root cause.
    let message = err.to_string();
    let root = err.root_cause().to_string();
    let ctx = ErrorContext::new(message);
    if root != ctx.message {
        ctx.with_details(root)
    } else {
        ctx
    }
}

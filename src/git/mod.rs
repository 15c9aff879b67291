//! Git operations wrapper for bpm's VCS transport.
//!
//! Like Cargo with `git-fetch-with-cli`, bpm shells out to the system `git`
//! binary rather than embedding a git library. That keeps authentication
//! (SSH agents, credential helpers, platform keychains) working exactly as
//! it does on the developer's machine and avoids re-implementing transport
//! edge cases.
//!
//! The transport exposes exactly the operations the bundle acquirer needs:
//!
//! - `clone(url, dir)` - full recursive clone into a cache entry
//! - `sync(ref)` - fetch plus fast-forward-only merge; failure here is
//!   non-fatal because a hard reset always follows
//! - `reset_hard(ref)` - force the working tree to exactly the pinned ref;
//!   failure is fatal ([`BpmError::RefNotFound`])
//! - `update_submodules()` - recursive submodule update, skipped offline
//! - `current_commit()` - HEAD hash, recorded into installed manifests
//!
//! All operations are async (tokio process spawning) and sequential per
//! repository; bpm never runs two git commands against the same working
//! tree concurrently.

pub mod command_builder;

use crate::core::BpmError;
use crate::git::command_builder::GitCommand;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Locate the git executable, falling back to the bare name so the OS
/// resolves it through PATH at spawn time.
pub fn get_git_command() -> String {
    which::which("git")
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "git".to_string())
}

/// Fail fast when git is not installed at all.
pub fn ensure_git_available() -> Result<()> {
    which::which("git").map_err(|_| BpmError::GitNotFound)?;
    Ok(())
}

/// Whether `path` looks like a usable git working tree.
pub fn is_valid_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Handle to a local git repository, holding only its path and querying
/// git directly for all state.
#[derive(Debug)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Create a handle for an existing local repository. Does not validate;
    /// use [`is_valid_git_repo`] first when the directory may be anything.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Clone `url` into `target`, recursing into submodules.
    pub async fn clone(url: &str, target: impl AsRef<Path>) -> Result<Self> {
        let target_path = target.as_ref();
        GitCommand::clone(url, target_path).execute().await?;
        Ok(Self::new(target_path))
    }

    /// Fast-forward-only sync against the pinned ref's remote.
    ///
    /// Fetches everything (so the subsequent hard reset can reach the ref)
    /// and then attempts an ff-only merge of `origin/<ref>`. Returns whether
    /// the sync fully succeeded; failure is reported to the caller but is
    /// not an error, because acquisition always hard-resets afterwards.
    pub async fn sync(&self, ref_name: &str) -> bool {
        if let Err(e) = GitCommand::fetch().current_dir(&self.path).execute_success().await {
            tracing::warn!(target: "git", "fetch failed for {}: {e:#}", self.path.display());
            return false;
        }
        match GitCommand::merge_ff_only(&format!("origin/{ref_name}"))
            .current_dir(&self.path)
            .execute_success()
            .await
        {
            Ok(()) => true,
            Err(e) => {
                // Detached HEAD or diverged history; the hard reset that
                // follows makes the working tree correct regardless.
                tracing::debug!(
                    target: "git",
                    "fast-forward of origin/{ref_name} failed (non-fatal): {e:#}"
                );
                false
            }
        }
    }

    /// Hard-reset the working tree to exactly `ref_name`.
    ///
    /// Tries the ref as given, then `origin/<ref>` for remote branches.
    /// Failure of both means the pin is unreachable: [`BpmError::RefNotFound`].
    pub async fn reset_hard(&self, ref_name: &str, repo_url: &str) -> Result<()> {
        let direct = GitCommand::reset_hard(ref_name)
            .current_dir(&self.path)
            .execute_success()
            .await;
        if direct.is_ok() {
            return Ok(());
        }

        let remote = GitCommand::reset_hard(&format!("origin/{ref_name}"))
            .current_dir(&self.path)
            .execute_success()
            .await;
        match remote {
            Ok(()) => Ok(()),
            Err(e) => Err(BpmError::RefNotFound {
                reference: ref_name.to_string(),
                repo: repo_url.to_string(),
                reason: format!("{e:#}"),
            }
            .into()),
        }
    }

    /// Recursive submodule update. No-op for repositories without
    /// submodules.
    pub async fn update_submodules(&self) -> Result<()> {
        GitCommand::submodule_update()
            .current_dir(&self.path)
            .execute_success()
            .await
    }

    /// The commit hash HEAD currently points at.
    pub async fn current_commit(&self) -> Result<String> {
        GitCommand::current_commit()
            .current_dir(&self.path)
            .execute_stdout()
            .await
    }

    /// The remote default branch name (e.g. `main`), when `origin/HEAD`
    /// is known locally.
    pub async fn default_branch(&self) -> Option<String> {
        let full = GitCommand::default_branch()
            .current_dir(&self.path)
            .execute_stdout()
            .await
            .ok()?;
        full.strip_prefix("origin/").map(ToString::to_string)
    }

    /// Whether this directory is a valid work tree.
    pub fn is_git_repo(&self) -> bool {
        is_valid_git_repo(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    /// Build a throwaway repository with one commit, returning its path.
    /// Uses the real git binary, like the rest of the transport.
    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir)
                .env("GIT_AUTHOR_NAME", "test")
                .env("GIT_AUTHOR_EMAIL", "test@example.com")
                .env("GIT_COMMITTER_NAME", "test")
                .env("GIT_COMMITTER_EMAIL", "test@example.com")
                .output()
                .expect("git not runnable");
            assert!(status.status.success(), "git {args:?} failed");
        };
        run(&["init", "-b", "master"]);
        std::fs::write(dir.join("README"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "initial"]);
    }

    #[test]
    fn test_is_valid_git_repo() {
        let dir = TempDir::new().unwrap();
        assert!(!is_valid_git_repo(dir.path()));
        init_repo(dir.path());
        assert!(is_valid_git_repo(dir.path()));
    }

    #[tokio::test]
    async fn test_clone_and_current_commit() {
        let origin = TempDir::new().unwrap();
        init_repo(origin.path());

        let target = TempDir::new().unwrap();
        let clone_path = target.path().join("clone");
        let repo = GitRepo::clone(&origin.path().display().to_string(), &clone_path)
            .await
            .unwrap();
        assert!(repo.is_git_repo());
        let sha = repo.current_commit().await.unwrap();
        assert_eq!(sha.len(), 40);
    }

    #[tokio::test]
    async fn test_reset_hard_unknown_ref_is_ref_not_found() {
        let origin = TempDir::new().unwrap();
        init_repo(origin.path());
        let repo = GitRepo::new(origin.path());

        let err = repo
            .reset_hard("no-such-tag", "file://origin")
            .await
            .unwrap_err();
        let bpm_err = err.downcast_ref::<BpmError>().expect("typed error");
        assert!(matches!(bpm_err, BpmError::RefNotFound { reference, .. }
            if reference == "no-such-tag"));
    }

    #[tokio::test]
    async fn test_sync_failure_is_non_fatal() {
        // A repo with no remote: fetch fails, sync reports false, no panic.
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let repo = GitRepo::new(dir.path());
        assert!(!repo.sync("master").await);
    }
}

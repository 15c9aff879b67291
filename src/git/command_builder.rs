//! Type-safe git command builder for consistent command execution.
//!
//! A fluent API for building and executing git commands, eliminating
//! duplication and ensuring consistent timeouts, logging and error handling
//! across the VCS transport.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::BpmError;
use crate::git::get_git_command;

/// Builder for constructing and executing git commands.
///
/// New commands are created with output capture enabled and a five minute
/// timeout, which covers clone and fetch on slow links while still failing
/// a hung authentication prompt.
///
/// # Examples
///
/// ```rust,ignore
/// let sha = GitCommand::current_commit()
///     .current_dir(&repo_path)
///     .execute_stdout()
///     .await?;
/// ```
pub struct GitCommand {
    /// Arguments passed to git (e.g. `["fetch", "origin"]`)
    args: Vec<String>,

    /// Working directory, passed via `-C` so the process cwd is untouched
    current_dir: Option<std::path::PathBuf>,

    /// Environment variables set for the git process
    env_vars: Vec<(String, String)>,

    /// Maximum duration to wait for completion (`None` = no timeout)
    timeout_duration: Option<Duration>,

    /// For clone commands, the URL for better error messages
    clone_url: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            // Default timeout of 5 minutes for network-bound operations
            timeout_duration: Some(Duration::from_secs(300)),
            clone_url: None,
        }
    }
}

impl GitCommand {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory for the command. Implemented with git's
    /// `-C` flag so the bpm process working directory is never involved.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the git process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Override the default timeout (`None` disables it).
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Execute the command and return its captured output.
    ///
    /// Non-zero exit maps to [`BpmError::GitCloneFailed`] for clone and
    /// [`BpmError::GitCommandError`] for everything else, with stderr
    /// carried in the error.
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let git_command = get_git_command();
        let mut cmd = Command::new(&git_command);

        let mut full_args = Vec::new();
        if let Some(ref dir) = self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.clone());
        cmd.args(&full_args);

        tracing::debug!(target: "git", "executing: {} {}", git_command, full_args.join(" "));

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            match timeout(duration, output_future).await {
                Ok(result) => {
                    result.context(format!("failed to execute git {}", full_args.join(" ")))?
                }
                Err(_) => {
                    tracing::warn!(
                        target: "git",
                        "command timed out after {}s: git {}",
                        duration.as_secs(),
                        full_args.join(" ")
                    );
                    return Err(BpmError::GitCommandError {
                        operation: effective_operation(&full_args),
                        stderr: format!(
                            "git command timed out after {} seconds; check network \
                             connectivity and credential prompts",
                            duration.as_secs()
                        ),
                    }
                    .into());
                }
            }
        } else {
            output_future
                .await
                .context(format!("failed to execute git {}", full_args.join(" ")))?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::debug!(
                target: "git",
                "command failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            );

            let error = match self.clone_url {
                Some(url) => BpmError::GitCloneFailed {
                    url,
                    reason: stderr,
                },
                None => BpmError::GitCommandError {
                    operation: effective_operation(&full_args),
                    stderr,
                },
            };
            return Err(error.into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stdout.trim().is_empty() {
            tracing::trace!(target: "git", "{}", stdout.trim());
        }

        Ok(GitCommandOutput { stdout, stderr })
    }

    /// Execute and return only stdout, trimmed.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute and discard the output, keeping only success/failure.
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// The git subcommand actually run, skipping a leading `-C <dir>` pair.
fn effective_operation(full_args: &[String]) -> String {
    let start = if full_args.first().map(String::as_str) == Some("-C") && full_args.len() > 2 {
        2
    } else {
        0
    };
    full_args
        .get(start)
        .cloned()
        .unwrap_or_else(|| "unknown".to_string())
}

/// Captured output from a git command.
pub struct GitCommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

// Convenience builders for the operations the acquirer uses.

impl GitCommand {
    /// Clone a repository, recursing into submodules.
    pub fn clone(url: &str, target: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new().args([
            "clone",
            "--recurse-submodules",
            url,
            &target.as_ref().display().to_string(),
        ]);
        cmd.clone_url = Some(url.to_string());
        cmd
    }

    /// Fetch all remotes and tags, forcing tag updates so re-pinned tags
    /// converge on the remote's view.
    pub fn fetch() -> Self {
        Self::new().args(["fetch", "--all", "--tags", "--force"])
    }

    /// Fast-forward-only merge of the given remote ref.
    pub fn merge_ff_only(remote_ref: &str) -> Self {
        Self::new().args(["merge", "--ff-only", remote_ref])
    }

    /// Hard reset the working tree to a ref.
    pub fn reset_hard(ref_name: &str) -> Self {
        Self::new().args(["reset", "--hard", ref_name])
    }

    /// Recursive submodule update.
    pub fn submodule_update() -> Self {
        Self::new().args(["submodule", "update", "--init", "--recursive"])
    }

    /// Resolve a ref to a commit hash, verifying it exists.
    pub fn rev_parse(ref_name: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", ref_name])
    }

    /// Current commit hash of HEAD.
    pub fn current_commit() -> Self {
        Self::new().args(["rev-parse", "HEAD"])
    }

    /// Short name of the remote default branch (`origin/HEAD`).
    pub fn default_branch() -> Self {
        Self::new().args(["rev-parse", "--abbrev-ref", "origin/HEAD"])
    }

    /// Check whether a directory is inside a git work tree.
    pub fn is_inside_work_tree() -> Self {
        Self::new().args(["rev-parse", "--is-inside-work-tree"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_operation_skips_dash_c() {
        let args: Vec<String> = ["-C", "/tmp/repo", "fetch", "--all"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(effective_operation(&args), "fetch");
    }

    #[test]
    fn test_effective_operation_plain() {
        let args: Vec<String> = ["clone", "url"].iter().map(ToString::to_string).collect();
        assert_eq!(effective_operation(&args), "clone");
    }

    #[test]
    fn test_clone_builder_records_url() {
        let cmd = GitCommand::clone("https://example.com/x.git", "/tmp/x");
        assert_eq!(cmd.clone_url.as_deref(), Some("https://example.com/x.git"));
        assert!(cmd.args.contains(&"--recurse-submodules".to_string()));
    }
}

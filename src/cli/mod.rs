//! Command-line interface for BPM (Bundle Package Manager).
//!
//! Each command lives in its own module with its own argument struct and
//! execution logic. Global flags (`--offline`, `--workers`, `--cache-dir`,
//! `--manifest-dir`, `--config`, `--verbose`, `--quiet`) are parsed here
//! and folded into [`Settings`] before the command runs.
//!
//! # Available Commands
//!
//! - `install` - Resolve and install one or more bundles
//! - `uninstall` - Remove installed bundles and their recorded files
//! - `lock` - Write a lockfile pinning every installed bundle
//! - `restore` - Replay a lockfile, reinstalling entries in file order
//! - `cache` - Manage the bundle source cache
//!
//! # Basic Workflow
//!
//! ```bash
//! # Install from a full descriptor or a registry short name
//! bpm install git::https://example.com/mylib.git::v1.2.0
//! bpm install mylib
//!
//! # Pin the installed state and replay it elsewhere
//! bpm lock
//! bpm restore
//!
//! # Drop cached sources
//! bpm cache clean
//! ```

mod cache;
mod install;
mod lock;
mod restore;
mod uninstall;

use crate::config::Settings;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI parser.
#[derive(Parser)]
#[command(
    name = "bpm",
    about = "Bundle Package Manager - acquire, build and install source bundles",
    version,
    long_about = "BPM installs source bundles from Git repositories and archives, \
                  running each bundle's declared build rules and tracking what was installed."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a custom config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Never touch the network for VCS bundles; fail on cache misses
    #[arg(long, global = true)]
    offline: bool,

    /// Worker count passed through to bundle build rules
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Override the bundle source cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Override the installed-manifest directory
    #[arg(long, global = true)]
    manifest_dir: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve and install bundles
    Install(install::InstallCommand),
    /// Remove installed bundles
    Uninstall(uninstall::UninstallCommand),
    /// Write a lockfile pinning the installed state
    Lock(lock::LockCommand),
    /// Reinstall bundles from a lockfile
    Restore(restore::RestoreCommand),
    /// Manage the bundle source cache
    Cache(cache::CacheCommand),
}

impl Cli {
    /// Initialize logging, assemble settings and dispatch the command.
    pub async fn execute(self) -> Result<()> {
        init_logging(self.verbose, self.quiet);
        let settings = self.build_settings()?;
        match self.command {
            Commands::Install(cmd) => cmd.execute(settings).await,
            Commands::Uninstall(cmd) => cmd.execute(settings).await,
            Commands::Lock(cmd) => cmd.execute(settings).await,
            Commands::Restore(cmd) => cmd.execute(settings).await,
            Commands::Cache(cmd) => cmd.execute(settings).await,
        }
    }

    /// Config file and environment first, then CLI flags on top.
    fn build_settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path)?,
            None => Settings::load()?,
        };
        if self.offline {
            settings.offline = true;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = dir.clone();
        }
        if let Some(dir) = &self.manifest_dir {
            settings.manifest_dir = dir.clone();
        }
        Ok(settings)
    }
}

/// Set up the tracing subscriber. `RUST_LOG` wins when set; otherwise
/// `--verbose` maps to debug and `--quiet` to errors only.
fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_install_with_global_flags() {
        let cli = Cli::try_parse_from([
            "bpm",
            "--offline",
            "--workers",
            "8",
            "install",
            "git::https://example.com/x.git::v1",
        ])
        .unwrap();
        assert!(cli.offline);
        assert_eq!(cli.workers, Some(8));
        assert!(matches!(cli.command, Commands::Install(_)));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["bpm", "-v", "-q", "lock"]).is_err());
    }

    #[test]
    fn test_install_requires_a_bundle() {
        assert!(Cli::try_parse_from(["bpm", "install"]).is_err());
    }
}

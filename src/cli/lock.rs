//! The `lock` command.

use crate::config::Settings;
use crate::lockfile::{LOCKFILE_NAME, LockFile};
use crate::manifest::ManifestStore;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Write a lockfile pinning every installed bundle at its exact state,
/// ordered so that dependencies precede their dependents.
#[derive(Args)]
pub struct LockCommand {
    /// Output path
    #[arg(short, long, default_value = LOCKFILE_NAME)]
    output: PathBuf,
}

impl LockCommand {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        let store = ManifestStore::new(settings.manifest_dir);
        let lock = LockFile::build(&store)?;
        lock.save(&self.output)?;
        println!(
            "{} {} ({} bundle{})",
            "Wrote".green().bold(),
            self.output.display(),
            lock.entries.len(),
            if lock.entries.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }
}

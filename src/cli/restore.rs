//! The `restore` command.

use crate::config::Settings;
use crate::installer::Installer;
use crate::lockfile::{LOCKFILE_NAME, LockFile};
use crate::runner::{ShellRuleEngine, TomlDescriptionLoader};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Reinstall every bundle a lockfile names, in file order, each pinned
/// to its recorded state. Dependency discovery is disabled during replay;
/// the lockfile's ordering is trusted instead.
#[derive(Args)]
pub struct RestoreCommand {
    /// Lockfile to replay
    #[arg(short, long, default_value = LOCKFILE_NAME)]
    lockfile: PathBuf,
}

impl RestoreCommand {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        let lock = LockFile::load(&self.lockfile)?;
        let count = lock.entries.len();
        let installer = Installer::new(settings, ShellRuleEngine, TomlDescriptionLoader)?;
        installer.restore(&lock).await?;
        println!(
            "{} {count} bundle{} from {}",
            "Restored".green().bold(),
            if count == 1 { "" } else { "s" },
            self.lockfile.display()
        );
        Ok(())
    }
}

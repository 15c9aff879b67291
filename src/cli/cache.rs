//! The `cache` command.

use crate::cache::Cache;
use crate::config::Settings;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

/// Manage the bundle source cache.
#[derive(Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand)]
enum CacheSubcommand {
    /// Delete every cached bundle source
    Clean,
    /// Print the cache directory path
    Dir,
}

impl CacheCommand {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        let cache = Cache::with_dir(settings.cache_dir);
        match self.command {
            CacheSubcommand::Clean => {
                let removed = cache.clear()?;
                println!(
                    "{} {removed} cached bundle{}",
                    "Removed".green().bold(),
                    if removed == 1 { "" } else { "s" }
                );
            }
            CacheSubcommand::Dir => {
                println!("{}", cache.dir().display());
            }
        }
        Ok(())
    }
}

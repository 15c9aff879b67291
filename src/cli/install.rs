//! The `install` command.

use crate::config::Settings;
use crate::installer::Installer;
use crate::runner::{ShellRuleEngine, TomlDescriptionLoader};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Resolve and install one or more bundle references.
///
/// A reference is a full descriptor (`type::repo::tag`, with type and tag
/// optional), a local directory, or a registry short name.
#[derive(Args)]
pub struct InstallCommand {
    /// Bundle references to install
    #[arg(required = true)]
    bundles: Vec<String>,

    /// Skip the install-deps phase of each bundle
    #[arg(long)]
    skip_deps: bool,
}

impl InstallCommand {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        let installer = Installer::new(settings, ShellRuleEngine, TomlDescriptionLoader)?;
        for raw in &self.bundles {
            installer.install(raw, self.skip_deps).await?;
            println!("{} {raw}", "Installed".green().bold());
        }
        Ok(())
    }
}

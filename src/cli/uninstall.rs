//! The `uninstall` command.

use crate::config::Settings;
use crate::descriptor::{BundleDescriptor, ParsedRef, bundle_name};
use crate::manifest::ManifestStore;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Remove installed bundles: delete every file their manifests recorded,
/// then the manifests themselves.
#[derive(Args)]
pub struct UninstallCommand {
    /// Bundle names or descriptors to remove
    #[arg(required = true)]
    bundles: Vec<String>,
}

impl UninstallCommand {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        let store = ManifestStore::new(settings.manifest_dir);
        for raw in &self.bundles {
            // Accept either a manifest name or a descriptor for the
            // same bundle.
            let name = match BundleDescriptor::parse(raw)? {
                ParsedRef::Descriptor(descriptor) => bundle_name(&descriptor.repo),
                ParsedRef::ShortName(short) => short,
            };
            let removed = store.remove(&name)?;
            println!(
                "{} {name} ({removed} file{})",
                "Removed".green().bold(),
                if removed == 1 { "" } else { "s" }
            );
        }
        Ok(())
    }
}

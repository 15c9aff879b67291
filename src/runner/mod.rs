//! Reference collaborators for the installer.
//!
//! The installer core only knows the [`RuleEngine`] and
//! [`DescriptionLoader`] traits; this module provides the stock
//! implementations the CLI wires in: a TOML build-description loader and
//! a rule engine that shells out for commands. Alternative evaluators
//! (a different description language, a containerized engine) plug in by
//! implementing the same traits.
//!
//! # Build description format
//!
//! A bundle describes itself in a `bundle.toml` at its source root:
//!
//! ```toml
//! dependencies = [
//!     "git::https://example.com/dep.git::v1.2.0",
//!     { repo = "https://example.com/other.git" },
//! ]
//!
//! [rules.build]
//! commands = ["make -j${BPM_WORKERS}"]
//!
//! [rules.install]
//! copy = [
//!     { src = "libfoo.a", dest = "lib" },
//!     { src = "foo.h", dest = "header" },
//! ]
//! ```
//!
//! Declared dependencies are compiled into the `install-deps` rule as
//! installer callbacks, appended after any commands the bundle defines
//! under `[rules.install-deps]` itself.

use crate::core::BpmError;
use crate::descriptor::RawDependency;
use crate::installer::{
    BuildDescription, CopyDest, DescriptionLoader, HostBindings, PhaseContext, Rule, RuleAction,
    RuleEngine, RuleSet,
};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Build description file name, looked up at the bundle source root.
pub const BUILD_DESCRIPTION: &str = "bundle.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptionFile {
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    rules: HashMap<String, RuleFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    copy: Vec<CopyFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyFile {
    src: PathBuf,
    dest: String,
}

fn parse_dest(raw: &str) -> Result<CopyDest> {
    match raw {
        "module" => Ok(CopyDest::Module),
        "header" | "include" => Ok(CopyDest::Header),
        "lib" => Ok(CopyDest::Lib),
        "bin" => Ok(CopyDest::Bin),
        other => bail!("unknown copy destination '{other}' (expected module, header, lib or bin)"),
    }
}

/// Loads `bundle.toml` build descriptions.
///
/// Evaluation only sees the description file and the host bindings the
/// installer passes in; nothing from the caller's state leaks through.
#[derive(Debug, Default, Clone)]
pub struct TomlDescriptionLoader;

impl DescriptionLoader for TomlDescriptionLoader {
    async fn load(&self, dir: &Path, _bindings: &HostBindings) -> Result<BuildDescription> {
        let path = dir.join(BUILD_DESCRIPTION);
        if !path.exists() {
            return Err(BpmError::BuildDescriptionNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file: DescriptionFile = toml::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;

        let mut rules = RuleSet::new();
        for (name, entry) in file.rules {
            let mut actions = Vec::with_capacity(entry.commands.len() + entry.copy.len());
            actions.extend(entry.commands.into_iter().map(RuleAction::Command));
            for copy in entry.copy {
                actions.push(RuleAction::Copy {
                    src: copy.src,
                    dest: parse_dest(&copy.dest)
                        .with_context(|| format!("in rule '{name}' of {}", path.display()))?,
                });
            }
            rules.insert(name, Rule { actions });
        }

        // Declared dependencies become installer callbacks at the end of
        // the install-deps rule.
        let mut deps_rule = rules.get("install-deps").cloned().unwrap_or_default();
        deps_rule.actions.extend(
            file.dependencies
                .iter()
                .cloned()
                .map(RuleAction::InstallDependency),
        );
        rules.insert("install-deps", deps_rule);

        Ok(BuildDescription {
            rules,
            dependencies: file.dependencies,
        })
    }
}

/// Rule engine that runs commands through the system shell-less spawn.
///
/// Command lines are split with shell-words (no shell interpolation
/// beyond that), spawned in the current working directory with the host
/// environment overrides applied, and streamed to the user's terminal.
/// The worker count is not interpreted here; it reaches build tools
/// through the `BPM_WORKERS` override.
#[derive(Debug, Default, Clone)]
pub struct ShellRuleEngine;

impl RuleEngine for ShellRuleEngine {
    async fn run_targets(
        &self,
        rules: &RuleSet,
        targets: &[&str],
        ctx: &PhaseContext<'_>,
    ) -> Result<()> {
        for target in targets {
            let Some(rule) = rules.get(target) else {
                tracing::debug!(target: "runner", "no rule for target '{target}', skipping");
                continue;
            };
            for action in &rule.actions {
                match action {
                    RuleAction::Command(line) => run_command(line, ctx.env).await?,
                    RuleAction::Copy { src, dest } => copy_into_root(src, *dest, ctx)?,
                    RuleAction::InstallDependency(dep) => {
                        ctx.installer.install_dependency(dep).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

async fn run_command(line: &str, env: &[(String, String)]) -> Result<()> {
    let argv = shell_words::split(line).with_context(|| format!("parsing command '{line}'"))?;
    let Some((program, args)) = argv.split_first() else {
        return Ok(());
    };
    tracing::debug!(target: "runner", "running: {line}");
    let status = tokio::process::Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .status()
        .await
        .with_context(|| format!("spawning '{program}'"))?;
    if !status.success() {
        bail!("command '{line}' exited with {status}");
    }
    Ok(())
}

fn copy_into_root(src: &Path, dest: CopyDest, ctx: &PhaseContext<'_>) -> Result<()> {
    let root = dest.root(ctx.roots);
    std::fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    let file_name = src
        .file_name()
        .with_context(|| format!("copy source '{}' has no file name", src.display()))?;
    let destination = root.join(file_name);
    std::fs::copy(src, &destination).with_context(|| {
        format!("copying {} to {}", src.display(), destination.display())
    })?;
    tracing::info!(target: "runner", "installed {}", destination.display());
    ctx.tracker.record(destination);
    Ok(())
}

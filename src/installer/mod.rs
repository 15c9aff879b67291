//! Recursive bundle installation.
//!
//! The installer ties the other components together: it resolves a raw
//! reference into a descriptor, asks the acquirer for a ready source tree,
//! changes into that tree, loads the bundle's build description through a
//! sandboxed loader, and invokes the external rule engine once per phase:
//! `install-deps`, `build`, `install` (the first is skipped during
//! lockfile replay, where dependencies are installed explicitly in file
//! order instead of being re-discovered).
//!
//! # External collaborators
//!
//! The engine that actually runs rules and the evaluator that loads build
//! descriptions are collaborators behind traits, not part of this core:
//!
//! - [`RuleEngine::run_targets`] runs the named targets from a bundle's
//!   rule set; targets with no matching rule are silently skipped, and the
//!   worker count is passed through opaquely.
//! - [`DescriptionLoader::load`] evaluates the bundle's build description
//!   with a fixed set of host bindings and no ambient caller state.
//!
//! Dependency recursion happens *inside* the `install-deps` phase: the
//! loader compiles declared dependencies into rule actions that call back
//! into the installer through the [`BundleInstaller`] capability carried
//! by the [`PhaseContext`]. The installer itself never independently walks
//! a dependency list.
//!
//! # Working directory ownership
//!
//! The installer exclusively owns the process working directory during a
//! traversal. Every directory change goes through [`WorkdirGuard`], which
//! restores the previous directory on all exit paths, including errors and
//! panics. The traversal is non-reentrant: one install run per process.

use crate::acquire::{self, AcquireOptions, Acquired};
use crate::cache::Cache;
use crate::config::{InstallRoots, Settings};
use crate::core::BpmError;
use crate::descriptor::{
    BundleDescriptor, BundleType, ParsedRef, RawDependency, Registry, bundle_name,
};
use crate::git::GitRepo;
use crate::lockfile::LockFile;
use crate::manifest::{InstallTracker, InstalledManifest, ManifestStore};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Phase sequence for a normal install.
pub const PHASES: [&str; 3] = ["install-deps", "build", "install"];

/// Phase sequence during lockfile replay (`skip_deps`): dependencies are
/// installed explicitly by the caller, in lock order.
pub const PHASES_NO_DEPS: [&str; 2] = ["build", "install"];

/// One action inside a rule.
#[derive(Debug, Clone)]
pub enum RuleAction {
    /// A shell command, executed by the engine in the bundle source
    /// directory with the host environment overrides applied.
    Command(String),
    /// Copy a file from the source tree into one of the install roots,
    /// recording the destination in the install tracker.
    Copy {
        /// Source path, relative to the bundle source directory
        src: PathBuf,
        /// Which install root receives the file
        dest: CopyDest,
    },
    /// Install one declared dependency by calling back into the
    /// installer. Compiled into the `install-deps` rule by the loader.
    InstallDependency(RawDependency),
}

/// Destination root for a [`RuleAction::Copy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDest {
    /// The module root
    Module,
    /// The header root
    Header,
    /// The library root
    Lib,
    /// The executable root
    Bin,
}

impl CopyDest {
    /// Resolve to the concrete directory under `roots`.
    pub fn root<'a>(self, roots: &'a InstallRoots) -> &'a Path {
        match self {
            Self::Module => &roots.module_dir,
            Self::Header => &roots.header_dir,
            Self::Lib => &roots.lib_dir,
            Self::Bin => &roots.bin_dir,
        }
    }
}

/// A named rule: an ordered list of actions.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    /// Actions run in order; the first failure aborts the rule.
    pub actions: Vec<RuleAction>,
}

/// A bundle's rule set, scoped to that bundle only and never inherited
/// from a parent install.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<String, Rule>,
}

impl RuleSet {
    /// Empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named rule.
    pub fn insert(&mut self, name: impl Into<String>, rule: Rule) {
        self.rules.insert(name.into(), rule);
    }

    /// Look up a rule by target name.
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Whether any rule is defined under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }
}

/// Result of evaluating a bundle's build description: its own rules and
/// its declared dependency list.
#[derive(Debug, Clone, Default)]
pub struct BuildDescription {
    /// Rules scoped to this bundle
    pub rules: RuleSet,
    /// Dependencies in declaration order
    pub dependencies: Vec<RawDependency>,
}

/// Host bindings exposed to the build-description evaluation: the bundle
/// source directory and the absolute-path install-root overrides. Nothing
/// else from the calling installer leaks into the sandbox.
#[derive(Debug, Clone)]
pub struct HostBindings {
    /// Absolute path of the bundle's source directory
    pub source_dir: PathBuf,
    /// Environment overrides (`BPM_MODULE_DIR`, `BPM_HEADER_DIR`,
    /// `BPM_LIB_DIR`, `BPM_BIN_DIR`, `BPM_SOURCE_DIR`, `BPM_WORKERS`),
    /// all paths absolute
    pub env: Vec<(String, String)>,
}

/// Callback capability letting rule actions install dependencies through
/// the running installer. Dyn-safe by construction (manually boxed
/// future) so it can be threaded through the engine as `&dyn`.
pub trait BundleInstaller: Sync {
    /// Install one declared dependency, recursing into its own
    /// dependencies.
    fn install_dependency<'a>(
        &'a self,
        dep: &'a RawDependency,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Everything a rule engine needs to run one phase: the callback into the
/// installer, the install tracker, the install roots and the environment
/// overrides for spawned commands.
pub struct PhaseContext<'a> {
    /// Callback for `install-deps` actions
    pub installer: &'a dyn BundleInstaller,
    /// Accumulator the `install` phase records destination paths into
    pub tracker: &'a InstallTracker,
    /// Install destination roots
    pub roots: &'a InstallRoots,
    /// Environment overrides for spawned rule commands
    pub env: &'a [(String, String)],
    /// Worker count, passed through opaquely
    pub workers: usize,
}

/// External rule engine contract.
pub trait RuleEngine: Sync {
    /// Run the named targets from `rules`, in order. Targets not present
    /// in the rule set are silently skipped; the first failing action
    /// aborts and propagates.
    fn run_targets(
        &self,
        rules: &RuleSet,
        targets: &[&str],
        ctx: &PhaseContext<'_>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// External sandboxed build-description evaluator contract.
pub trait DescriptionLoader: Sync {
    /// Evaluate the build description in `dir` with the given host
    /// bindings, yielding the bundle's rules and declared dependencies.
    /// Fails when no build description exists or evaluation raises.
    fn load(
        &self,
        dir: &Path,
        bindings: &HostBindings,
    ) -> impl Future<Output = Result<BuildDescription>> + Send;
}

/// Scoped process-working-directory change, restored on drop.
///
/// The working directory is process-wide state, so this guard is the only
/// sanctioned way to change it: construction records the previous
/// directory, drop restores it on every exit path.
#[derive(Debug)]
pub struct WorkdirGuard {
    prev: PathBuf,
}

impl WorkdirGuard {
    /// Change into `target`, remembering the current directory.
    pub fn enter(target: &Path) -> Result<Self> {
        let prev = std::env::current_dir().context("reading current directory")?;
        std::env::set_current_dir(target)
            .with_context(|| format!("entering {}", target.display()))?;
        tracing::debug!(target: "installer", "entered {}", target.display());
        Ok(Self { prev })
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.prev) {
            tracing::warn!(
                target: "installer",
                "failed to restore working directory {}: {e}",
                self.prev.display()
            );
        }
    }
}

/// The installer. Generic over its two external collaborators; holds the
/// cache, manifest store and package index registry for one traversal.
pub struct Installer<E: RuleEngine, L: DescriptionLoader> {
    settings: Settings,
    cache: Cache,
    store: ManifestStore,
    registry: Registry,
    index_descriptor: BundleDescriptor,
    engine: E,
    loader: L,
    tracker: InstallTracker,
}

impl<E: RuleEngine + Send + Sync, L: DescriptionLoader + Send + Sync> Installer<E, L> {
    /// Build an installer from settings and the two collaborators.
    pub fn new(settings: Settings, engine: E, loader: L) -> Result<Self> {
        let cache = Cache::with_dir(settings.cache_dir.clone());
        let store = ManifestStore::new(settings.manifest_dir.clone());
        let index_descriptor = BundleDescriptor::parse_full(&settings.index)
            .context("invalid package index descriptor in configuration")?;
        let registry = Registry::new(cache.entry_dir(&index_descriptor.repo));
        Ok(Self {
            settings,
            cache,
            store,
            registry,
            index_descriptor,
            engine,
            loader,
            tracker: InstallTracker::new(),
        })
    }

    /// The manifest store backing this installer.
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Resolve a raw reference into a descriptor.
    ///
    /// Short names go through the package index; when the index is not
    /// present locally yet, the index bundle is installed first and the
    /// lookup retried exactly once before failing with
    /// [`BpmError::BundleNotFound`].
    pub async fn resolve(&self, raw: &str) -> Result<BundleDescriptor> {
        match BundleDescriptor::parse(raw)? {
            ParsedRef::Descriptor(descriptor) => Ok(descriptor),
            ParsedRef::ShortName(name) => {
                if let Some(target) = self.registry.lookup(&name)? {
                    return BundleDescriptor::parse_full(&target);
                }
                // A locally present index that lacks the name is
                // authoritative; bootstrapping is only for a missing index.
                if self.registry.is_present() {
                    return Err(BpmError::BundleNotFound { name }.into());
                }
                tracing::info!(
                    target: "installer",
                    "short name '{name}' unknown; installing package index"
                );
                self.install_descriptor(&self.index_descriptor, false)
                    .await
                    .context("installing package index bundle")?;
                self.registry.invalidate();
                match self.registry.lookup(&name)? {
                    Some(target) => BundleDescriptor::parse_full(&target),
                    None => Err(BpmError::BundleNotFound { name }.into()),
                }
            }
        }
    }

    /// Resolve and install a raw bundle reference.
    pub async fn install(&self, raw: &str, skip_deps: bool) -> Result<()> {
        let descriptor = self.resolve(raw).await?;
        self.install_descriptor(&descriptor, skip_deps).await
    }

    /// Install an already-resolved descriptor.
    ///
    /// Acquires the source tree, changes into it (restored on every exit
    /// path), loads the build description, runs the phases, and records
    /// the installed manifest. Any failure aborts the whole install and
    /// propagates after working-directory restoration; no rollback is
    /// attempted.
    pub async fn install_descriptor(
        &self,
        descriptor: &BundleDescriptor,
        skip_deps: bool,
    ) -> Result<()> {
        let name = bundle_name(&descriptor.repo);
        tracing::info!(target: "installer", "installing '{name}' from {}", descriptor.repo);

        let options = AcquireOptions {
            offline: self.settings.offline,
            archive_offline: self.settings.archive_offline,
        };
        let acquired = acquire::acquire(descriptor, &self.cache, &options).await?;

        // Absolutize everything before the cwd changes; relative cache or
        // root paths would otherwise resolve against the bundle directory.
        let source_dir = std::path::absolute(&acquired.dir)
            .with_context(|| format!("absolutizing {}", acquired.dir.display()))?;
        let bindings = self.host_bindings(&source_dir)?;

        let _workdir = WorkdirGuard::enter(&source_dir)?;

        let description = self.loader.load(&source_dir, &bindings).await?;

        // Paths recorded before this point belong to an enclosing install
        // (a parent rule running ahead of its dependency callbacks); only
        // what the phases below record goes into this bundle's manifest.
        let tracker_mark = self.tracker.mark();

        let phases: &[&str] = if skip_deps { &PHASES_NO_DEPS } else { &PHASES };
        let ctx = PhaseContext {
            installer: self,
            tracker: &self.tracker,
            roots: &self.settings.roots,
            env: &bindings.env,
            workers: self.settings.workers,
        };
        for phase in phases {
            tracing::debug!(target: "installer", "running phase '{phase}' for '{name}'");
            self.engine
                .run_targets(&description.rules, &[phase], &ctx)
                .await
                .with_context(|| format!("phase '{phase}' failed for bundle '{name}'"))?;
        }

        self.record_manifest(
            &name,
            descriptor,
            &acquired,
            &source_dir,
            &description,
            tracker_mark,
        )
        .await?;
        Ok(())
    }

    /// Replay a lockfile: one install per entry, in file order, with
    /// dependency discovery disabled. File order is authoritative; the
    /// loader never re-sorts.
    pub async fn restore(&self, lock: &LockFile) -> Result<()> {
        for entry in &lock.entries {
            let descriptor = entry.to_descriptor();
            self.install_descriptor(&descriptor, true)
                .await
                .with_context(|| format!("replaying lock entry for {}", entry.repo))?;
        }
        Ok(())
    }

    /// Environment overrides for this install: install roots and source
    /// directory as absolute paths, plus the opaque worker count.
    fn host_bindings(&self, source_dir: &Path) -> Result<HostBindings> {
        let roots = &self.settings.roots;
        let absolute = |p: &Path| -> Result<String> {
            Ok(std::path::absolute(p)
                .with_context(|| format!("absolutizing {}", p.display()))?
                .display()
                .to_string())
        };
        let source = absolute(source_dir)?;
        Ok(HostBindings {
            source_dir: PathBuf::from(&source),
            env: vec![
                ("BPM_MODULE_DIR".to_string(), absolute(&roots.module_dir)?),
                ("BPM_HEADER_DIR".to_string(), absolute(&roots.header_dir)?),
                ("BPM_LIB_DIR".to_string(), absolute(&roots.lib_dir)?),
                ("BPM_BIN_DIR".to_string(), absolute(&roots.bin_dir)?),
                ("BPM_SOURCE_DIR".to_string(), source),
                ("BPM_WORKERS".to_string(), self.settings.workers.to_string()),
            ],
        })
    }

    /// Record the installed manifest: the pin, the declared dependencies
    /// (short names resolved so lockfile ordering matches), and the paths
    /// this bundle's own phases recorded (those past `tracker_mark`).
    async fn record_manifest(
        &self,
        name: &str,
        descriptor: &BundleDescriptor,
        acquired: &Acquired,
        source_dir: &Path,
        description: &BuildDescription,
        tracker_mark: usize,
    ) -> Result<()> {
        let paths = self.tracker.drain_from(tracker_mark);

        let (repo, sha) = if descriptor.is_local() && acquired.dir == Path::new(&descriptor.repo) {
            // Dev bundle used in place: no pin, excluded from lockfiles.
            (None, None)
        } else {
            let sha = match descriptor.kind {
                BundleType::Vcs => Some(GitRepo::new(source_dir).current_commit().await?),
                BundleType::Archive => acquired.archive_checksum.clone(),
            };
            (Some(descriptor.repo.clone()), sha)
        };

        let mut dependencies = Vec::with_capacity(description.dependencies.len());
        for dep in &description.dependencies {
            dependencies.push(self.normalize_dependency(dep));
        }

        self.store.save(
            name,
            &InstalledManifest {
                repo,
                sha,
                dependencies,
                paths,
            },
        )
    }

    /// Rewrite short-name dependencies to their index targets so manifest
    /// dependency identifiers line up with the dependency's own manifest.
    /// By the time a manifest is recorded the index has been consulted, so
    /// a miss here is only logged.
    fn normalize_dependency(&self, dep: &RawDependency) -> RawDependency {
        if let RawDependency::Reference(raw) = dep {
            if let Ok(ParsedRef::ShortName(name)) = BundleDescriptor::parse(raw) {
                match self.registry.lookup(&name) {
                    Ok(Some(target)) => return RawDependency::Reference(target),
                    Ok(None) | Err(_) => {
                        tracing::warn!(
                            target: "installer",
                            "cannot normalize short-name dependency '{name}'"
                        );
                    }
                }
            }
        }
        dep.clone()
    }
}

impl<E: RuleEngine + Send + Sync, L: DescriptionLoader + Send + Sync> BundleInstaller
    for Installer<E, L>
{
    fn install_dependency<'a>(
        &'a self,
        dep: &'a RawDependency,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match dep {
                RawDependency::Reference(raw) => self.install(raw, false).await,
                RawDependency::Record(descriptor) => {
                    self.install_descriptor(descriptor, false).await
                }
            }
        })
    }
}

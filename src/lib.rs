//! # BPM - Bundle Package Manager
//!
//! BPM installs *bundles*: source packages fetched from Git repositories
//! or downloadable archives, built in place by their own declared rules,
//! and tracked so they can be removed or pinned later.
//!
//! # Architecture
//!
//! The crate is organized around a small set of cooperating components:
//!
//! - [`descriptor`] - The `type::repo::tag` reference grammar, short-name
//!   resolution through the package index, and dependency records
//! - [`acquire`] - Turning a descriptor into a ready source tree: Git
//!   clone/sync/reset for VCS bundles, download and extraction for
//!   archives, with a content-addressed cache and offline modes
//! - [`cache`] - Cache entry naming and lifecycle
//! - [`installer`] - The recursive install traversal: working-directory
//!   ownership, phase orchestration (`install-deps`, `build`, `install`)
//!   and the collaborator traits for the rule engine and the
//!   build-description loader
//! - [`runner`] - Reference collaborators: `bundle.toml` descriptions and
//!   a shell-command rule engine
//! - [`manifest`] - Per-bundle installed manifests and the install
//!   tracker
//! - [`lockfile`] - Dependency-ordered lockfiles for reproducible
//!   restores
//! - [`cli`] - The `bpm` command-line interface
//!
//! # Example
//!
//! ```bash
//! bpm install git::https://example.com/mylib.git::v1.2.0
//! bpm lock
//! bpm restore
//! ```

pub mod acquire;
pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod descriptor;
pub mod git;
pub mod installer;
pub mod lockfile;
pub mod manifest;
pub mod runner;

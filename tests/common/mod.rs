//! Shared helpers for integration tests.

use assert_cmd::Command;
use std::path::Path;

/// A `bpm` invocation isolated from the developer's real configuration:
/// config, cache and manifests all point into the given sandbox root.
pub fn bpm(sandbox: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bpm").expect("bpm binary");
    cmd.env("BPM_CONFIG_PATH", sandbox.join("config.toml"))
        .env("BPM_CACHE_DIR", sandbox.join("cache"))
        .env("BPM_MANIFEST_DIR", sandbox.join("manifests"))
        .env_remove("BPM_OFFLINE")
        .env_remove("BPM_WORKERS")
        .env_remove("RUST_LOG");
    cmd
}

/// Write a manifest file directly into the sandbox's manifest directory.
#[allow(dead_code)]
pub fn write_manifest(sandbox: &Path, name: &str, contents: &str) {
    let dir = sandbox.join("manifests");
    std::fs::create_dir_all(&dir).expect("create manifest dir");
    std::fs::write(dir.join(format!("{name}.toml")), contents).expect("write manifest");
}

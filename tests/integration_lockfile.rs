//! Lockfile generation through the CLI: dependency ordering, cycle
//! reporting and the line-oriented on-disk format.

use tempfile::TempDir;

mod common;
use common::{bpm, write_manifest};

#[test]
fn test_lock_orders_dependencies_before_dependents() {
    let sandbox = TempDir::new().unwrap();
    write_manifest(
        sandbox.path(),
        "app",
        r#"
repo = "https://example.com/app.git"
sha = "aaaa1111"
dependencies = ["https://example.com/base.git"]
paths = []
"#,
    );
    write_manifest(
        sandbox.path(),
        "base",
        r#"
repo = "https://example.com/base.git"
sha = "bbbb2222"
paths = []
"#,
    );

    let out = sandbox.path().join("bpm.lock");
    bpm(sandbox.path())
        .args(["lock", "-o"])
        .arg(&out)
        .assert()
        .success();

    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.first(), Some(&"["));
    assert_eq!(lines.last(), Some(&"]"));
    // One record per line, dependency first.
    assert!(lines[1].contains("base.git"), "got {text}");
    assert!(lines[2].contains("app.git"), "got {text}");
    assert!(lines[1].contains("bbbb2222"));
}

#[test]
fn test_lock_cycle_names_every_unplaced_bundle() {
    let sandbox = TempDir::new().unwrap();
    write_manifest(
        sandbox.path(),
        "a",
        r#"
repo = "https://example.com/a.git"
sha = "aaaa"
dependencies = ["https://example.com/b.git"]
paths = []
"#,
    );
    write_manifest(
        sandbox.path(),
        "b",
        r#"
repo = "https://example.com/b.git"
sha = "bbbb"
dependencies = ["https://example.com/a.git"]
paths = []
"#,
    );

    let assert = bpm(sandbox.path()).arg("lock").assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("a.git"), "stderr: {stderr}");
    assert!(stderr.contains("b.git"), "stderr: {stderr}");
}

#[test]
fn test_lock_excludes_local_dev_bundles() {
    let sandbox = TempDir::new().unwrap();
    write_manifest(
        sandbox.path(),
        "pinned",
        r#"
repo = "https://example.com/pinned.git"
sha = "cccc"
paths = []
"#,
    );
    // No repo, no sha: a dev bundle installed from a local directory.
    write_manifest(sandbox.path(), "dev", "paths = []\n");

    let out = sandbox.path().join("bpm.lock");
    bpm(sandbox.path())
        .args(["lock", "-o"])
        .arg(&out)
        .assert()
        .success();

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("pinned.git"));
    assert!(!text.contains("dev"), "got {text}");
}

#[test]
fn test_lock_then_restore_offline_fails_on_empty_cache() {
    // Restore replays pinned VCS entries; with an empty cache and
    // --offline the first entry must fail with a cache-miss error
    // instead of touching the network.
    let sandbox = TempDir::new().unwrap();
    write_manifest(
        sandbox.path(),
        "base",
        r#"
repo = "https://example.com/base.git"
sha = "bbbb2222"
paths = []
"#,
    );

    let out = sandbox.path().join("bpm.lock");
    bpm(sandbox.path())
        .args(["lock", "-o"])
        .arg(&out)
        .assert()
        .success();

    let assert = bpm(sandbox.path())
        .args(["--offline", "restore", "-l"])
        .arg(&out)
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("offline"), "stderr: {stderr}");
}

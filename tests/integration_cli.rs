//! End-to-end CLI flows against local bundles: install, uninstall,
//! cache management and error rendering.

use predicates::prelude::*;
use tempfile::TempDir;

mod common;
use common::bpm;

/// A local bundle directory with a build description that installs one
/// header file.
fn make_header_bundle(root: &std::path::Path, name: &str) -> std::path::PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{name}.h")), "#define VERSION 1\n").unwrap();
    std::fs::write(
        dir.join("bundle.toml"),
        format!(
            r#"
[rules.install]
copy = [{{ src = "{name}.h", dest = "header" }}]
"#
        ),
    )
    .unwrap();
    dir
}

/// Config file pointing every install root into the sandbox.
fn write_config(sandbox: &std::path::Path) {
    let roots = sandbox.join("roots");
    std::fs::write(
        sandbox.join("config.toml"),
        format!(
            r#"
[roots]
module_dir = "{base}/modules"
header_dir = "{base}/include"
lib_dir = "{base}/lib"
bin_dir = "{base}/bin"
"#,
            base = roots.display()
        ),
    )
    .unwrap();
}

#[test]
fn test_install_local_bundle_copies_into_header_root() {
    let sandbox = TempDir::new().unwrap();
    write_config(sandbox.path());
    let bundle = make_header_bundle(sandbox.path(), "mylib");

    bpm(sandbox.path())
        .arg("install")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed"));

    let installed = sandbox.path().join("roots/include/mylib.h");
    assert!(installed.exists(), "header not installed");

    // A manifest was recorded; local dev bundles carry no pin.
    let manifest =
        std::fs::read_to_string(sandbox.path().join("manifests/mylib.toml")).unwrap();
    assert!(manifest.contains("mylib.h"));
    assert!(!manifest.contains("sha"), "got {manifest}");
}

#[test]
fn test_uninstall_removes_files_and_manifest() {
    let sandbox = TempDir::new().unwrap();
    write_config(sandbox.path());
    let bundle = make_header_bundle(sandbox.path(), "mylib");

    bpm(sandbox.path()).arg("install").arg(&bundle).assert().success();
    let installed = sandbox.path().join("roots/include/mylib.h");
    assert!(installed.exists());

    bpm(sandbox.path())
        .args(["uninstall", "mylib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!installed.exists(), "header still present");
    assert!(!sandbox.path().join("manifests/mylib.toml").exists());
}

#[test]
fn test_install_without_build_description_fails() {
    let sandbox = TempDir::new().unwrap();
    write_config(sandbox.path());
    let dir = sandbox.path().join("empty");
    std::fs::create_dir_all(&dir).unwrap();

    let assert = bpm(sandbox.path()).arg("install").arg(&dir).assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("bundle.toml"), "stderr: {stderr}");
}

#[test]
fn test_install_rejects_malformed_descriptor() {
    let sandbox = TempDir::new().unwrap();
    bpm(sandbox.path())
        .args(["install", "git::https://example.com/x.git::v1::extra"])
        .assert()
        .failure();
}

#[test]
fn test_cache_dir_honors_override() {
    let sandbox = TempDir::new().unwrap();
    bpm(sandbox.path())
        .args(["cache", "dir"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            sandbox.path().join("cache").display().to_string(),
        ));
}

#[test]
fn test_cache_clean_reports_removed_entries() {
    let sandbox = TempDir::new().unwrap();
    let cache = sandbox.path().join("cache");
    std::fs::create_dir_all(cache.join("mylib-aabbccdd")).unwrap();
    std::fs::create_dir_all(cache.join("other-11223344")).unwrap();

    bpm(sandbox.path())
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 cached bundles"));
    assert!(!cache.join("mylib-aabbccdd").exists());
}

#[test]
fn test_build_rule_failure_aborts_install() {
    let sandbox = TempDir::new().unwrap();
    write_config(sandbox.path());
    let dir = sandbox.path().join("broken");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("bundle.toml"),
        r#"
[rules.build]
commands = ["false"]
"#,
    )
    .unwrap();

    bpm(sandbox.path()).arg("install").arg(&dir).assert().failure();
    // No manifest is recorded for a failed install.
    assert!(!sandbox.path().join("manifests/broken.toml").exists());
}

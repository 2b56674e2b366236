//! CLI integration tests for thirdparty.
//!
//! Every test runs against a private toolbase and source root inside a temp
//! directory, with an empty config file so user configuration never leaks in.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Scratch roots plus a `thirdparty` command pointed at them.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "").unwrap();
        Sandbox { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn toolbase(&self) -> PathBuf {
        self.path().join("tools")
    }

    fn sources(&self) -> PathBuf {
        self.path().join("sources")
    }

    fn catalogue(&self, contents: &str) -> PathBuf {
        let path = self.path().join("catalogue.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("thirdparty").unwrap();
        cmd.current_dir(self.path())
            .arg("--config")
            .arg(self.path().join("config.toml"))
            .env("THIRDPARTY_TOOLBASE", self.toolbase())
            .env("THIRDPARTY_SOURCES", self.sources())
            .env_remove("THIRDPARTY_JOBS");
        cmd
    }
}

const HEADERS_THEN_BROKEN: &str = r#"
[[package]]
name = "headers"
version = "1.0"
capabilities = ["no-archive"]

[[package]]
name = "tool"
version = "2.0"
capabilities = ["autotools"]
archives = [{ url = "https://example.invalid/tool-2.0.dmg" }]
"#;

// ============================================================================
// thirdparty platform
// ============================================================================

#[test]
fn test_platform_reports_roots() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .arg("platform")
        .assert()
        .success()
        .stdout(predicate::str::contains("os:"))
        .stdout(predicate::str::contains(sandbox.toolbase().display().to_string()))
        .stdout(predicate::str::contains(
            sandbox.sources().join("downloads").display().to_string(),
        ));
}

#[test]
fn test_platform_json_honors_jobs() {
    let sandbox = Sandbox::new();

    let output = sandbox
        .cmd()
        .args(["platform", "--json", "--jobs", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["jobs"], 3);
    assert!(value["platform"]["cpu_count"].as_u64().unwrap() >= 1);
}

#[test]
fn test_broken_explicit_config_is_fatal() {
    let sandbox = Sandbox::new();
    fs::write(sandbox.path().join("config.toml"), "[build\n").unwrap();

    sandbox
        .cmd()
        .arg("platform")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

// ============================================================================
// thirdparty paths
// ============================================================================

#[test]
fn test_paths_shows_install_directory() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);

    let install = sandbox.toolbase().join("headers").join("headers-1.0");
    sandbox
        .cmd()
        .arg("paths")
        .arg(&catalogue)
        .arg("headers")
        .assert()
        .success()
        .stdout(predicate::str::contains(install.display().to_string()))
        .stdout(predicate::str::contains("include:"));
}

#[test]
fn test_paths_json() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);

    let output = sandbox
        .cmd()
        .arg("paths")
        .arg(&catalogue)
        .args(["tool", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["name"], "tool");
    assert_eq!(
        value["source"].as_str().unwrap(),
        sandbox
            .sources()
            .join("extracted")
            .join("tool")
            .join("tool-2.0")
            .display()
            .to_string()
    );
}

#[test]
fn test_paths_unknown_package() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);

    sandbox
        .cmd()
        .arg("paths")
        .arg(&catalogue)
        .arg("zlib")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no package named `zlib`"));
}

// ============================================================================
// thirdparty build
// ============================================================================

#[test]
fn test_build_stops_at_unknown_archive() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);

    sandbox
        .cmd()
        .arg("build")
        .arg(&catalogue)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Completed headers"))
        .stderr(predicate::str::contains(
            "extract_source_archives failed for `tool`",
        ))
        .stderr(predicate::str::contains("don't know how to extract"));

    assert!(!sandbox.sources().join("logs").join("tool").exists());
}

#[test]
fn test_build_only_selected_package() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);

    sandbox
        .cmd()
        .arg("build")
        .arg(&catalogue)
        .args(["--only", "headers"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Finished headers 1.0"))
        .stderr(predicate::str::contains("Built 1 package(s)"));
}

#[test]
fn test_build_only_unknown_package() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);

    sandbox
        .cmd()
        .arg("build")
        .arg(&catalogue)
        .args(["--only", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("available packages: headers, tool"));
}

#[cfg(unix)]
#[test]
fn test_build_runs_verify_probe() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(
        r#"
[[package]]
name = "tclsh"
version = "8.6"
capabilities = ["no-archive"]
verify = { program = "sh", stdin = "echo honk", expect = "honk" }

[[package]]
name = "silent"
version = "1.0"
capabilities = ["no-archive"]
verify = { program = "sh", stdin = "echo quiet", expect = "honk" }
"#,
    );

    sandbox
        .cmd()
        .arg("build")
        .arg(&catalogue)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Finished tclsh 8.6"))
        .stderr(predicate::str::contains("verify failed for `silent`"));
}

#[test]
fn test_build_rejects_invalid_catalogue() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue("[[package]]\nname = \"x\"\nversion = \"1\"\ncapabilities = [\"scons\"]\n");

    sandbox
        .cmd()
        .arg("build")
        .arg(&catalogue)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown capability 'scons'"));
}

// ============================================================================
// thirdparty clean
// ============================================================================

#[test]
fn test_clean_removes_extracted_tree() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);
    let extracted = sandbox.sources().join("extracted").join("tool").join("tool-2.0");
    fs::create_dir_all(&extracted).unwrap();
    fs::write(extracted.join("configure"), "#!/bin/sh\n").unwrap();

    sandbox
        .cmd()
        .arg("clean")
        .arg(&catalogue)
        .arg("tool")
        .assert()
        .success()
        .stderr(predicate::str::contains("Cleaned tool"));

    assert!(!sandbox.sources().join("extracted").join("tool").exists());
}

#[test]
fn test_clean_all_removes_downloads() {
    let sandbox = Sandbox::new();
    let catalogue = sandbox.catalogue(HEADERS_THEN_BROKEN);
    let downloads = sandbox.sources().join("downloads").join("tool");
    fs::create_dir_all(&downloads).unwrap();
    fs::write(downloads.join("tool-2.0.dmg"), "x").unwrap();

    sandbox
        .cmd()
        .arg("clean")
        .arg(&catalogue)
        .arg("--all")
        .assert()
        .success();

    assert!(!downloads.exists());
}

// ============================================================================
// thirdparty completions
// ============================================================================

#[test]
fn test_completions_bash() {
    Command::cargo_bin("thirdparty")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("thirdparty"));
}

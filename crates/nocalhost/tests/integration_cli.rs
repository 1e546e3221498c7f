//! End-to-end checks of the `nocalhost` binary against a scratch data directory
//!
//! None of these need a cluster: they exercise settings loading, the binding
//! registry, and how missing workflow CLIs are reported.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let config = format!(
            "base_url = \"https://nocalhost.example.com\"\ndata_dir = {:?}\n\n[user]\nemail = \"user@x.com\"\n",
            data_dir.display().to_string()
        );
        fs::write(dir.path().join("config.toml"), config).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn write_catalog(&self) {
        let catalog = r#"{
  "devSpaces": [{"id": 7, "clusterId": 7, "namespace": "dev-7"}],
  "applications": [{"id": 1, "context": {"applicationName": "demo", "source": "git", "installType": "rawManifest"}}]
}"#;
        fs::write(self.data_dir().join("catalog.json"), catalog).unwrap();
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("nocalhost").unwrap();
        cmd.env_remove("NOCALHOST_CONFIG")
            .env_remove("NOCALHOST_NHCTL")
            .env_remove("NOCALHOST_KUBECTL")
            .env_remove("NOCALHOST_DATA_DIR")
            .env_remove("NOCALHOST_LOG")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.config());
        cmd
    }
}

fn missing_binary(dir: &Path, name: &str) -> String {
    dir.join("bin").join(name).display().to_string()
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("nocalhost").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tree"))
        .stdout(predicate::str::contains("dev"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("bindings"));
}

#[test]
fn test_bindings_empty() {
    let ws = Workspace::new();
    ws.command()
        .arg("bindings")
        .assert()
        .success()
        .stdout(predicate::str::contains("No local bindings"));
}

#[test]
fn test_bindings_reads_registry() {
    let ws = Workspace::new();
    let registry = r#"{
  "version": 1,
  "bindings": [{
    "host": "https://nocalhost.example.com",
    "email": "user@x.com",
    "application": "demo",
    "devspaceId": 7,
    "workload": "web",
    "localPath": "/home/u/demo",
    "createdAt": "2026-01-01T00:00:00Z"
  }]
}"#;
    fs::write(ws.data_dir().join("bindings.json"), registry).unwrap();

    ws.command()
        .arg("bindings")
        .assert()
        .success()
        .stdout(predicate::str::contains("7/demo/web"))
        .stdout(predicate::str::contains("/home/u/demo"));

    let output = ws
        .command()
        .args(["bindings", "--output", "json"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json[0]["workload"], "web");
    assert_eq!(json[0]["devspaceId"], 7);
}

#[test]
fn test_tree_reports_failed_branch() {
    let ws = Workspace::new();
    ws.write_catalog();
    ws.command()
        .arg("--nhctl")
        .arg(missing_binary(ws.dir.path(), "nhctl"))
        .arg("tree")
        .assert()
        .failure()
        .stdout(predicate::str::contains("user@x.com"))
        .stderr(predicate::str::contains("could not be refreshed"));
}

#[test]
fn test_tree_rejects_unknown_type() {
    let ws = Workspace::new();
    ws.write_catalog();
    ws.command()
        .args(["tree", "--expand", "Widgets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown resource type: Widgets"));
}

#[test]
fn test_dev_start_unknown_devspace() {
    let ws = Workspace::new();
    ws.write_catalog();
    ws.command()
        .args([
            "dev", "start", "--devspace", "99", "--app", "demo", "--workload", "web", "--container", "web",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dev space 99 not found in catalog"));
}

#[test]
fn test_install_unknown_application() {
    let ws = Workspace::new();
    ws.write_catalog();
    ws.command()
        .args(["install", "--devspace", "7", "--app", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Application missing not found in catalog"));
}

#[test]
fn test_logs_missing_kubectl_hint() {
    let ws = Workspace::new();
    ws.write_catalog();
    ws.command()
        .arg("--kubectl")
        .arg(missing_binary(ws.dir.path(), "kubectl"))
        .args(["logs", "--devspace", "7", "--pod", "web-1", "--container", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("--kubectl"));
}

#[test]
fn test_missing_catalog() {
    let ws = Workspace::new();
    ws.command()
        .args(["dev", "end", "--devspace", "7", "--app", "demo", "--workload", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load catalog"));
}

#[test]
fn test_json_logs_on_stderr() {
    let ws = Workspace::new();
    let output = ws
        .command()
        .args(["--log-format", "json", "--log-level", "debug", "bindings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No local bindings"));

    let stderr = String::from_utf8_lossy(&output.get_output().stderr);
    let records: Vec<serde_json::Value> = stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("log line should be JSON"))
        .collect();
    assert!(records
        .iter()
        .any(|r| r["fields"]["message"] == "Opened binding registry"));
}

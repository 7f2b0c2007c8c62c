use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn confmark_bin() -> String {
    env!("CARGO_BIN_EXE_confmark").to_string()
}

struct Device {
    dir: TempDir,
}

impl Device {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn local_file(&self) -> PathBuf {
        self.dir.path().join("preferences.json")
    }

    /// Run the binary against this device's files, ignoring the user's config
    fn run(&self, args: &[&str]) -> Output {
        Command::new(confmark_bin())
            .arg("--config")
            .arg(self.dir.path().join("config.toml"))
            .arg("--local")
            .arg(self.local_file())
            .args(args)
            .env_remove("CONFMARK_USER")
            .env_remove("CONFMARK_EMAIL")
            .env_remove("CONFMARK_LOCAL")
            .env_remove("CONFMARK_REMOTE")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }

    fn run_json(&self, args: &[&str]) -> Value {
        let mut full = args.to_vec();
        full.push("--json");
        let output = self.run(&full);
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        last_event(&output)
    }
}

fn last_event(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().last().expect("no output");
    serde_json::from_str(line).unwrap()
}

fn sqlite_remote(dir: &Path) -> String {
    format!("sqlite:{}", dir.join("remote.db").display())
}

#[test]
fn test_bookmark_and_list_signed_out() {
    let device = Device::new();

    let event = device.run_json(&["bookmark", "s42", "--title", "Keynote"]);
    assert_eq!(event["type"], "added");
    assert_eq!(event["collection"], "bookmarks");

    let event = device.run_json(&["list"]);
    assert_eq!(event["bookmarks"], serde_json::json!(["s42"]));
    assert_eq!(event["is_authenticated"], false);

    let event = device.run_json(&["unbookmark", "s42"]);
    assert_eq!(event["type"], "removed");

    let event = device.run_json(&["list"]);
    assert_eq!(event["bookmarks"], serde_json::json!([]));
}

#[test]
fn test_check_reports_both_collections() {
    let device = Device::new();
    device.run_json(&["star", "s1"]);

    let event = device.run_json(&["check", "s1"]);
    assert_eq!(event["type"], "check");
    assert_eq!(event["bookmarked"], false);
    assert_eq!(event["starred"], true);
}

#[test]
fn test_first_sync_then_second_device() {
    let shared = TempDir::new().unwrap();
    let remote = sqlite_remote(shared.path());

    let laptop = Device::new();
    laptop.run_json(&["bookmark", "s1"]);
    laptop.run_json(&["star", "s2"]);

    let event = laptop.run_json(&["--user", "alice", "--remote", &remote, "sync"]);
    assert_eq!(event["type"], "loaded");
    assert_eq!(event["outcome"]["mode"], "first_sync");
    assert_eq!(event["outcome"]["backfilled"], 2);

    // Second sync on the same device mirrors the remote
    let event = laptop.run_json(&["--user", "alice", "--remote", &remote, "sync"]);
    assert_eq!(event["outcome"]["mode"], "mirrored");

    let phone = Device::new();
    let event = phone.run_json(&["--user", "alice", "--remote", &remote, "list"]);
    assert_eq!(event["bookmarks"], serde_json::json!(["s1"]));
    assert_eq!(event["starred"], serde_json::json!(["s2"]));
    assert_eq!(event["is_authenticated"], true);
}

#[test]
fn test_signed_in_write_reaches_remote() {
    let shared = TempDir::new().unwrap();
    let remote = sqlite_remote(shared.path());

    let laptop = Device::new();
    laptop.run_json(&["--user", "bob", "--remote", &remote, "star", "s9"]);

    let phone = Device::new();
    let event = phone.run_json(&["--user", "bob", "--remote", &remote, "check", "s9"]);
    assert_eq!(event["starred"], true);
}

#[test]
fn test_status() {
    let shared = TempDir::new().unwrap();
    let remote = sqlite_remote(shared.path());
    let device = Device::new();

    let event = device.run_json(&["status"]);
    assert_eq!(event["type"], "status");
    assert_eq!(event["identity"], Value::Null);
    assert_eq!(event["remote"], Value::Null);

    let event = device.run_json(&["--user", "carol", "--remote", &remote, "status"]);
    assert_eq!(event["identity"], "carol");
    assert_eq!(event["remote"], "sqlite");
    assert_eq!(event["first_sync_done"], true);
}

#[test]
fn test_clear_keeps_remote() {
    let shared = TempDir::new().unwrap();
    let remote = sqlite_remote(shared.path());
    let device = Device::new();

    device.run_json(&["--user", "dan", "--remote", &remote, "bookmark", "s3"]);
    let event = device.run_json(&["clear"]);
    assert_eq!(event["type"], "cleared");

    let event = device.run_json(&["list"]);
    assert_eq!(event["bookmarks"], serde_json::json!([]));

    // Returning identity restores from the remote
    let event = device.run_json(&["--user", "dan", "--remote", &remote, "list"]);
    assert_eq!(event["bookmarks"], serde_json::json!(["s3"]));
}

#[test]
fn test_invalid_remote_fails() {
    let device = Device::new();
    let output = device.run(&["--remote", "ftp://nowhere", "list"]);
    assert!(!output.status.success());
}

#[test]
fn test_human_output() {
    let device = Device::new();
    let output = device.run(&["bookmark", "s5"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Bookmarked"));
    assert!(stdout.contains("s5"));
}

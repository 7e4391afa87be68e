//! End-to-end tests for the `flowstore` binary against a temporary SQLite file.
//!
//! stdout is a pipe under the test harness, so every command answers in JSON.

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

struct Env {
    _dir: TempDir,
    db: std::path::PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("nested").join("flowstore.db");
        Self { _dir: dir, db }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("flowstore").unwrap();
        cmd.env_remove("FLOWSTORE_DIALECT")
            .env_remove("FLOWSTORE_DATABASE_URL")
            .env_remove("FLOWSTORE_DB")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(&self.db);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let out = self.cmd().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&out).unwrap()
    }
}

#[test]
fn migrate_creates_file_and_reports_versions() {
    let env = Env::new();
    let out = env.json(&["migrate"]);

    assert!(env.db.exists());
    assert_eq!(out["dialect"], "sqlite");
    assert_eq!(out["applied"].as_array().unwrap().len(), 5);
    assert!(out["pending"].as_array().unwrap().is_empty());

    // Second run is a no-op.
    let again = env.json(&["migrate"]);
    assert_eq!(again["applied"], out["applied"]);
}

#[test]
fn task_lifecycle() {
    let env = Env::new();
    env.json(&["task", "save", "TASK-001", "--title", "Add login", "--initiative", "INIT-001"]);
    env.json(&["task", "save", "TASK-002", "--title", "Fix logout"]);
    let updated = env.json(&["task", "save", "TASK-001", "--status", "running"]);
    assert_eq!(updated["status"], "running");
    assert_eq!(updated["title"], "Add login");

    let list = env.json(&["task", "list", "--status", "running"]);
    assert_eq!(list["total"], 1);
    assert_eq!(list["tasks"][0]["id"], "TASK-001");

    env.json(&["phase", "save", "TASK-001", "implement", "--status", "completed", "--cost", "1.25"]);
    let shown = env.json(&["task", "show", "TASK-001"]);
    assert_eq!(shown["phases"][0]["phase_id"], "implement");
    assert_eq!(shown["total_cost_usd"], 1.25);

    env.json(&["task", "delete", "TASK-001"]);
    env.cmd()
        .args(["task", "show", "TASK-001"])
        .assert()
        .code(3);
}

#[test]
fn new_task_without_title_is_validation_error() {
    let env = Env::new();
    let out = env
        .cmd()
        .args(["task", "save", "TASK-001"])
        .assert()
        .code(4)
        .get_output()
        .stderr
        .clone();
    let err: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(err["error"]["code"], "INVALID_ARGUMENT");
}

#[test]
fn duplicate_events_are_ignored() {
    let env = Env::new();
    env.json(&["task", "save", "TASK-001", "--title", "t"]);

    let args = [
        "event", "append", "TASK-001", "phase", "--phase", "implement",
        "--at", "2024-01-15T12:00:00Z", "--data", r#"{"status":"started"}"#,
    ];
    let first = env.json(&args);
    assert_eq!(first["duplicate"], false);
    assert!(first["id"].as_i64().unwrap() > 0);

    let second = env.json(&args);
    assert_eq!(second["duplicate"], true);

    env.json(&["event", "append", "TASK-001", "error", "--at", "2024-01-15T12:05:00Z"]);

    assert_eq!(env.json(&["event", "count", "--task", "TASK-001"])["count"], 2);
    assert_eq!(env.json(&["event", "count", "-t", "error"])["count"], 1);

    let listed = env.json(&["event", "list", "--titles"]);
    assert_eq!(listed[0]["event_type"], "error");
    assert_eq!(listed[0]["task_title"], "t");
    assert_eq!(listed[1]["data"]["status"], "started");
}

#[test]
fn transcript_pages_follow_cursors() {
    let env = Env::new();
    env.json(&["task", "save", "TASK-001", "--title", "t"]);
    for i in 0..5 {
        env.json(&["transcript", "add", "TASK-001", "implement", &format!("message {i}")]);
    }

    let first = env.json(&["transcript", "list", "TASK-001", "-n", "2"]);
    assert_eq!(first["total_count"], 5);
    assert_eq!(first["has_more"], true);
    let cursor = first["next_cursor"].as_str().unwrap().to_string();

    let second = env.json(&["transcript", "list", "TASK-001", "-n", "2", "--cursor", &cursor]);
    assert_eq!(second["transcripts"][0]["content"], "message 2");
    assert!(second["prev_cursor"].is_string());

    env.cmd()
        .args(["transcript", "list", "TASK-001", "--cursor", "sideways.3"])
        .assert()
        .code(4);

    let hits = env.json(&["transcript", "search", "message"]);
    assert_eq!(hits.as_array().unwrap().len(), 5);

    let phases = env.json(&["transcript", "phases", "TASK-001"]);
    assert_eq!(phases[0]["transcript_count"], 5);
}

#[test]
fn dashboard_on_empty_database() {
    let env = Env::new();
    let out = env.json(&["dashboard"]);
    assert_eq!(out["status"]["total"], 0);
    assert!(out["initiatives"].as_array().unwrap().is_empty());
}

#[test]
fn postgres_without_dsn_is_config_error() {
    let env = Env::new();
    env.cmd().args(["--dialect", "postgres", "migrate"]).assert().code(7);
}

#[test]
fn version_needs_no_database() {
    let env = Env::new();
    let out = env.json(&["version"]);
    assert_eq!(out["schema"], "005_task_target_branch");
    assert!(!env.db.exists());
}

#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn weave(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("weave").unwrap();
    cmd.current_dir(dir.path())
        .env("WEAVE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init(dir: &TempDir) {
    weave(dir).arg("init").assert().success();
}

fn json(dir: &TempDir, args: &[&str]) -> Value {
    let out = weave(dir).arg("--json").args(args).output().unwrap();
    assert!(
        out.status.success(),
        "weave {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// init / config
// ---------------------------------------------------------------------------

#[test]
fn init_creates_weave_dir() {
    let dir = TempDir::new().unwrap();
    weave(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .weave/config.yaml"));

    assert!(dir.path().join(".weave").is_dir());
    assert!(dir.path().join(".weave/config.yaml").exists());
    assert!(dir.path().join(".weave/.gitignore").exists());
    assert!(dir.path().join(".weave/weave.db").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .weave/config.yaml"));
}

#[test]
fn default_config_validates() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn broken_config_fails_validation() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    std::fs::write(
        dir.path().join(".weave/config.yaml"),
        "impact:\n  min_impact: 0.5\n  max_impact: 0.1\n",
    )
    .unwrap();
    weave(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config validation found errors"));
}

// ---------------------------------------------------------------------------
// agents / messages / field
// ---------------------------------------------------------------------------

#[test]
fn register_twice_keeps_one_agent() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir)
        .args(["agent", "register", "A", "--capabilities", "code"])
        .assert()
        .success();
    weave(&dir)
        .args(["agent", "register", "A", "--capabilities", "review,harmony:wisdom"])
        .assert()
        .success();

    let agents = json(&dir, &["agent", "list"]);
    let agents = agents.as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["capabilities"], serde_json::json!(["review", "harmony:wisdom"]));
}

#[test]
fn beginner_gratitude_moves_field_by_base_impact() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir).args(["agent", "register", "A"]).assert().success();
    weave(&dir).args(["agent", "register", "B"]).assert().success();

    let sent = json(
        &dir,
        &["message", "send", "A", "B", "thank", "you", "--type", "gratitude"],
    );
    assert!(close(sent["field_impact"].as_f64().unwrap(), 0.07));
    assert!(close(sent["previous_coherence"].as_f64().unwrap(), 75.0));
    assert!(close(sent["new_coherence"].as_f64().unwrap(), 75.07));

    // Coherence survives across processes.
    let field = json(&dir, &["field"]);
    assert!(close(field["coherence"].as_f64().unwrap(), 75.07));
}

#[test]
fn unknown_message_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir)
        .args(["message", "send", "A", "B", "hi", "--type", "shouting"])
        .assert()
        .failure();
}

#[test]
fn inbox_read_and_ack() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    let sent = json(&dir, &["message", "send", "A", "B", "hello"]);
    let id = sent["message_id"].as_i64().unwrap().to_string();
    json(&dir, &["message", "send", "A", "all", "everyone"]);

    let inbox = json(&dir, &["message", "list", "B", "--unread"]);
    assert_eq!(inbox.as_array().unwrap().len(), 2);

    weave(&dir).args(["message", "ack", &id]).assert().success();
    let inbox = json(&dir, &["message", "list", "B", "--unread"]);
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    weave(&dir)
        .args(["message", "read", "9999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("message 9999 not found"));
}

#[test]
fn shared_state_round_trips() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir)
        .args(["state", "set", "mode", r#"{"phase":"build"}"#, "--by", "A"])
        .assert()
        .success();
    let entry = json(&dir, &["state", "get", "mode"]);
    assert_eq!(entry["value"]["phase"], "build");
    assert_eq!(entry["updated_by"], "A");

    weave(&dir)
        .args(["state", "get", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ---------------------------------------------------------------------------
// work items
// ---------------------------------------------------------------------------

#[test]
fn progress_to_25_fires_started_and_milestone() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    json(&dir, &["work", "create", "Build", "it", "--id", "W", "--by", "A"]);

    let out = json(&dir, &["work", "progress", "W", "25", "--by", "A"]);
    let fired: Vec<&str> = out["transitions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["transition"].as_str().unwrap())
        .collect();
    assert_eq!(fired, vec!["started", "milestone"]);
    assert_eq!(out["item"]["status"], "in_progress");

    let ledger = json(&dir, &["work", "transitions", "W"]);
    let ledger_sum: f64 = ledger
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["field_impact"].as_f64().unwrap())
        .sum();
    let item = json(&dir, &["work", "show", "W"]);
    let cumulative = item["metadata"]["cumulativeFieldImpact"].as_f64().unwrap();
    assert!(close(cumulative, ledger_sum));

    let history = json(&dir, &["work", "history", "W"]);
    assert_eq!(history.as_array().unwrap().len(), 3);
}

#[test]
fn out_of_range_progress_fails() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    json(&dir, &["work", "create", "Thing", "--id", "W", "--by", "A"]);
    weave(&dir)
        .args(["work", "progress", "W", "150"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn unknown_work_item_reports_not_found() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir)
        .args(["work", "progress", "nope", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("work item 'nope' not found"));
}

#[test]
fn block_then_unblock_records_both() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    json(&dir, &["work", "create", "Thing", "--id", "W", "--by", "A"]);
    json(&dir, &["work", "progress", "W", "10", "--by", "A"]);

    let blocked = json(&dir, &["work", "block", "W", "waiting", "--by", "A"]);
    assert_eq!(blocked["item"]["status"], "blocked");
    let unblocked = json(&dir, &["work", "unblock", "W", "resolved", "--by", "A"]);
    assert_eq!(unblocked["item"]["status"], "in_progress");

    let ledger = json(&dir, &["work", "transitions", "W"]);
    let kinds: Vec<&str> = ledger
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["transition"].as_str().unwrap())
        .collect();
    // newest first
    assert_eq!(kinds[0], "unblocked");
    assert_eq!(kinds[1], "blocked");
}

#[test]
fn completed_work_leaves_open_list() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    json(&dir, &["work", "create", "One", "--id", "W1", "--by", "A"]);
    json(&dir, &["work", "create", "Two", "--id", "W2", "--by", "A"]);
    json(&dir, &["work", "progress", "W2", "100", "--by", "A"]);

    let open = json(&dir, &["work", "list"]);
    assert_eq!(open.as_array().unwrap().len(), 1);
    let all = json(&dir, &["work", "list", "--all"]);
    assert_eq!(all.as_array().unwrap().len(), 2);

    weave(&dir)
        .args(["work", "progress", "W2", "50"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// analytics / dashboard / cleanup
// ---------------------------------------------------------------------------

#[test]
fn transition_analytics_counts_items() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    json(&dir, &["work", "create", "One", "--id", "W1", "--by", "A"]);
    json(&dir, &["work", "progress", "W1", "60", "--by", "A"]);

    let a = json(&dir, &["analytics", "transitions"]);
    assert_eq!(a["overall"]["unique_work_items"], 1);
    // created, started, milestone 25, milestone 50
    assert_eq!(a["overall"]["total_transitions"], 4);

    let m = json(&dir, &["analytics", "messages"]);
    assert_eq!(m["overview"]["total"], 4);
}

#[test]
fn dashboard_summarizes_store() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir).args(["agent", "register", "A"]).assert().success();
    json(&dir, &["work", "create", "One", "--id", "W1", "--by", "A"]);

    let d = json(&dir, &["dashboard"]);
    assert_eq!(d["active_agents"].as_array().unwrap().len(), 1);
    assert_eq!(d["pending_work"].as_array().unwrap().len(), 1);
    assert_eq!(d["work_counts"]["pending"], 1);
    assert!(d["field"]["coherence"].as_f64().unwrap() > 75.0);

    weave(&dir)
        .arg("dashboard")
        .assert()
        .success()
        .stdout(predicate::str::contains("Active agents (1)"));
}

#[test]
fn cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    weave(&dir).args(["agent", "register", "A"]).assert().success();
    let first = json(&dir, &["cleanup"]);
    assert_eq!(first["messages_pruned"], 0);
    let second = json(&dir, &["cleanup"]);
    assert_eq!(first, second);
}

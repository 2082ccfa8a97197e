//! E2E CLI tests for field workflows:
//! - `pk workflow add-transition/enable/show`
//! - Transitions restricted to groups
//! - Rejected transitions leave the previous value in place
//!
//! Each test runs `pk` as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn pk_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pk"));
    cmd.current_dir(dir);
    cmd.env("PICKLIST_ACTOR", "alice");
    cmd.env("PICKLIST_LOG", "error");
    cmd.env_remove("PICKLIST_FORMAT");
    cmd
}

fn pk_ok(dir: &Path, args: &[&str]) {
    pk_cmd(dir).args(args).assert().success();
}

fn pk_json(dir: &Path, args: &[&str]) -> Value {
    let output = pk_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("pk should not crash");
    assert!(
        output.status.success(),
        "pk {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

/// A project with a `status` field (Open, Review, Closed) whose workflow
/// lets anyone open and review but only `leads` close. Alice is a
/// developer, Carol a lead.
fn workflow_project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    pk_ok(root, &["init"]);
    for login in ["alice", "carol"] {
        pk_ok(root, &["user", "create", login]);
    }
    pk_ok(root, &["group", "create", "devs"]);
    pk_ok(root, &["group", "create", "leads"]);
    pk_ok(root, &["group", "add-member", "devs", "alice"]);
    pk_ok(root, &["group", "add-member", "devs", "carol"]);
    pk_ok(root, &["group", "add-member", "leads", "carol"]);

    pk_ok(root, &["field", "create", "status", "--label", "Status"]);
    for value in ["Open", "Review", "Closed"] {
        pk_ok(root, &["field", "add-value", "status", value]);
    }
    pk_ok(root, &["perm", "grant", "status", "devs", "read", "submit", "update"]);

    pk_ok(root, &["workflow", "add-transition", "status", "--to", "Open"]);
    pk_ok(
        root,
        &["workflow", "add-transition", "status", "--from", "Open", "--to", "Review"],
    );
    pk_ok(
        root,
        &[
            "workflow",
            "add-transition",
            "status",
            "--from",
            "Review",
            "--to",
            "Closed",
            "--group",
            "leads",
        ],
    );
    pk_ok(root, &["workflow", "enable", "status"]);
    dir
}

fn create_open_artifact(dir: &Path) -> String {
    let json = pk_json(dir, &["artifact", "create", "Release 2.0", "--set", "status=Open"]);
    json["artifact"]["id"].as_i64().expect("artifact id").to_string()
}

fn current_status(dir: &Path, id: &str) -> String {
    let show = pk_json(dir, &["show", id]);
    show["fields"][0]["labels"][0]
        .as_str()
        .expect("status label")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn workflow_show_lists_transitions() {
    let dir = workflow_project();
    let json = pk_json(dir.path(), &["workflow", "show", "status"]);
    assert_eq!(json["enabled"], true);
    assert_eq!(json["transitions"].as_array().expect("transitions").len(), 3);

    pk_cmd(dir.path())
        .args(["workflow", "show", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Review"))
        .stdout(predicate::str::contains("leads"));
}

#[test]
fn allowed_transitions_are_recorded() {
    let dir = workflow_project();
    let id = create_open_artifact(dir.path());

    let report = pk_json(dir.path(), &["set", &id, "status=Review"]);
    assert_eq!(report["fields"][0]["outcome"]["status"], "updated");
    assert_eq!(current_status(dir.path(), &id), "Review");

    pk_cmd(dir.path())
        .env("PICKLIST_ACTOR", "carol")
        .args(["set", &id, "status=Closed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("changed from Review to Closed"));
    assert_eq!(current_status(dir.path(), &id), "Closed");
}

#[test]
fn transition_outside_the_workflow_is_rejected() {
    let dir = workflow_project();
    let id = create_open_artifact(dir.path());

    let output = pk_cmd(dir.path())
        .args(["set", &id, "status=Closed", "--json"])
        .output()
        .expect("pk should not crash");
    assert!(!output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("report");
    assert_eq!(report["fields"][0]["outcome"]["status"], "rejected");
    assert_eq!(
        report["fields"][0]["outcome"]["errors"][0]["kind"],
        "invalid_transition"
    );
    assert_eq!(current_status(dir.path(), &id), "Open");
}

#[test]
fn unauthorized_transition_is_rejected() {
    let dir = workflow_project();
    let id = create_open_artifact(dir.path());
    pk_ok(dir.path(), &["set", &id, "status=Review"]);

    let output = pk_cmd(dir.path())
        .args(["set", &id, "status=Closed", "--json"])
        .output()
        .expect("pk should not crash");
    assert!(!output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("report");
    assert_eq!(
        report["fields"][0]["outcome"]["errors"][0]["kind"],
        "transition_not_authorized"
    );
    let err: Value = serde_json::Deserializer::from_slice(&output.stderr)
        .into_iter::<Value>()
        .next()
        .expect("JSON error")
        .expect("valid JSON");
    assert_eq!(err["error"]["error_code"], "E3005");
    assert_eq!(current_status(dir.path(), &id), "Review");
}

#[test]
fn disabled_workflow_allows_any_change() {
    let dir = workflow_project();
    let id = create_open_artifact(dir.path());
    pk_ok(dir.path(), &["workflow", "disable", "status"]);

    pk_ok(dir.path(), &["set", &id, "status=Closed"]);
    assert_eq!(current_status(dir.path(), &id), "Closed");
}

#[test]
fn history_text_lists_each_change() {
    let dir = workflow_project();
    let id = create_open_artifact(dir.path());
    pk_ok(dir.path(), &["set", &id, "status=Review"]);

    pk_cmd(dir.path())
        .args(["history", &id, "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("set to Open"))
        .stdout(predicate::str::contains("changed from Open to Review"));
}

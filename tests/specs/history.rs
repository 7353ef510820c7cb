//! History filters.

use crate::prelude::Repo;

fn seeded_repo() -> Repo {
    let repo = Repo::new();
    repo.write_dag("ok", Repo::single_step("ok", &["true"]));
    repo.write_dag("bad", Repo::single_step("bad", &["false"]));
    repo.write_dag("ok2", Repo::single_step("ok2", &["true"]));

    repo.dagrun()
        .args(["start", "--run-id", "a", "ok"])
        .assert()
        .success();
    repo.dagrun()
        .args(["start", "--run-id", "b", "bad"])
        .assert()
        .code(1);
    repo.dagrun()
        .args(["start", "--run-id", "c", "ok2"])
        .assert()
        .success();
    repo
}

#[test]
fn status_filter_matches_only_failures() {
    let repo = seeded_repo();
    let output = repo
        .dagrun()
        .args(["history", "--status", "failed"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bad"), "{stdout}");
    assert!(!stdout.contains("ok"), "{stdout}");
}

#[test]
fn last_window_matches_recent_runs() {
    let repo = seeded_repo();
    let output = repo
        .dagrun()
        .args(["history", "--last", "1h", "--format", "json"])
        .output()
        .unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 3);
}

#[test]
fn future_window_matches_nothing() {
    let repo = seeded_repo();
    repo.dagrun()
        .args(["history", "--from", "2999-01-01"])
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "No DAG runs found matching the specified filters.",
        ));
}

#[test]
fn run_id_filter_is_a_substring_match() {
    let repo = seeded_repo();
    let output = repo
        .dagrun()
        .args(["history", "--run-id", "b", "--format", "json"])
        .output()
        .unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "bad");
}

#[test]
fn name_scopes_the_listing() {
    let repo = seeded_repo();
    let output = repo
        .dagrun()
        .args(["history", "--format", "json", "ok"])
        .output()
        .unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "ok");
}

//! Retry shares the run id; restart preserves params under a new one.

use crate::prelude::Repo;

#[test]
fn retry_adds_an_attempt_under_the_same_run_id() {
    let repo = Repo::new();
    repo.write_dag("flaky", Repo::single_step("flaky", &["false"]));

    repo.dagrun()
        .args(["start", "--run-id", "r", "flaky"])
        .assert()
        .code(1);

    // Retry opens a second attempt sharing run-id r (still failing here)
    repo.dagrun()
        .args(["retry", "--run-id", "r", "flaky"])
        .assert()
        .code(1);

    let attempts = repo.attempt_dirs("flaky", "r");
    assert_eq!(attempts.len(), 2, "attempts: {attempts:?}");
}

#[test]
fn retry_of_unknown_run_fails() {
    let repo = Repo::new();
    repo.write_dag("ok", Repo::single_step("ok", &["true"]));
    repo.dagrun()
        .args(["retry", "--run-id", "ghost", "ok"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("no attempt found"));
}

#[test]
fn restart_preserves_params_under_a_new_run_id() {
    let repo = Repo::new();
    repo.write_dag("d", Repo::single_step("d", &["true"]));

    repo.dagrun()
        .args(["start", "--run-id", "r1", "--params", "p3 p4", "d"])
        .assert()
        .success();

    repo.dagrun().args(["restart", "d"]).assert().success();

    // Two terminal runs with equal params
    let output = repo
        .dagrun()
        .args(["history", "--format", "json", "d"])
        .output()
        .unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row["params"], "p3 p4");
        assert_eq!(row["status"], "succeeded");
    }
    // Distinct run ids
    assert_ne!(rows[0]["run_id"], rows[1]["run_id"]);
}

#[test]
fn stop_of_a_finished_run_is_a_noop() {
    let repo = Repo::new();
    repo.write_dag("ok", Repo::single_step("ok", &["true"]));
    repo.dagrun()
        .args(["start", "--run-id", "r1", "ok"])
        .assert()
        .success();

    repo.dagrun()
        .args(["stop", "--run-id", "r1", "ok"])
        .assert()
        .success()
        .stdout(predicates::str::contains("stopped ok:r1"));
}

//! Admission conflict and singleton enforcement.

use crate::prelude::Repo;
use std::time::Duration;

#[test]
fn start_runs_a_dag_to_success() {
    let repo = Repo::new();
    repo.write_dag("ok", Repo::single_step("ok", &["true"]));

    repo.dagrun()
        .args(["start", "--run-id", "r1", "ok"])
        .assert()
        .success()
        .stdout(predicates::str::contains("succeeded"));

    assert_eq!(repo.attempt_dirs("ok", "r1").len(), 1);
}

#[test]
fn failing_dag_exits_nonzero() {
    let repo = Repo::new();
    repo.write_dag("bad", Repo::single_step("bad", &["false"]));

    repo.dagrun()
        .args(["start", "--run-id", "r1", "bad"])
        .assert()
        .code(1);
}

#[test]
fn duplicate_run_id_is_an_admission_conflict() {
    let repo = Repo::new();
    repo.write_dag("ok", Repo::single_step("ok", &["true"]));

    repo.dagrun()
        .args(["start", "--run-id", "r1", "ok"])
        .assert()
        .success();

    // Same (dag, run-id) again: conflict, admission exit code
    repo.dagrun()
        .args(["start", "--run-id", "r1", "ok"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("already exists"));

    // Exactly one attempt survives, terminal
    assert_eq!(repo.attempt_dirs("ok", "r1").len(), 1);
}

#[test]
fn invalid_run_id_is_rejected() {
    let repo = Repo::new();
    repo.write_dag("ok", Repo::single_step("ok", &["true"]));

    repo.dagrun()
        .args(["start", "--run-id", "not ok", "ok"])
        .assert()
        .failure();
}

#[test]
fn singleton_second_start_rejects_with_no_queue() {
    let repo = Repo::new();
    repo.write_dag(
        "single",
        Repo::single_step_bounded("single", &["sleep", "5"], 1),
    );

    // First run holds the only slot; run it in the background
    let mut first = std::process::Command::new(Repo::bin())
        .args(["start", "--run-id", "r1", "single"])
        .env("DAGRUN_HOME", repo.root())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(1500));

    repo.dagrun()
        .args(["start", "--run-id", "r2", "--no-queue", "single"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("already running"));

    let _ = first.kill();
    let _ = first.wait();
}

#[test]
fn singleton_second_start_queues_when_allowed() {
    let repo = Repo::new();
    repo.write_dag(
        "single",
        Repo::single_step_bounded("single", &["sleep", "5"], 1),
    );

    let mut first = std::process::Command::new(Repo::bin())
        .args(["start", "--run-id", "r1", "single"])
        .env("DAGRUN_HOME", repo.root())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(1500));

    repo.dagrun()
        .args(["start", "--run-id", "r2", "single"])
        .assert()
        .success()
        .stdout(predicates::str::contains("queued single:r2"));

    // The deferred run sits on the DAG's queue with a Queued record
    assert_eq!(repo.queue_items("single").len(), 1);
    repo.dagrun()
        .args(["status", "--run-id", "r2", "single"])
        .assert()
        .success()
        .stdout(predicates::str::contains("status:   queued"));

    let _ = first.kill();
    let _ = first.wait();
}

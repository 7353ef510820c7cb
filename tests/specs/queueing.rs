//! Queue FIFO order and the dequeue verb.

use crate::prelude::Repo;

fn enqueue(repo: &Repo, dag: &str, run_id: &str) {
    repo.dagrun()
        .args(["enqueue", "--workflow-id", run_id, dag])
        .assert()
        .success()
        .stdout(predicates::str::contains(format!("queued {dag}:{run_id}")));
}

#[test]
fn enqueue_records_a_queued_run() {
    let repo = Repo::new();
    repo.write_dag("q", Repo::single_step_bounded("q", &["true"], 1));

    enqueue(&repo, "q", "e1");

    assert_eq!(repo.queue_items("q").len(), 1);
    repo.dagrun()
        .args(["status", "--run-id", "e1", "q"])
        .assert()
        .success()
        .stdout(predicates::str::contains("status:   queued"));
}

#[test]
fn dequeue_head_preserves_fifo_order_of_the_rest() {
    let repo = Repo::new();
    repo.write_dag("q", Repo::single_step_bounded("q", &["true"], 1));

    for run_id in ["e1", "e2", "e3"] {
        enqueue(&repo, "q", run_id);
    }
    assert_eq!(repo.queue_items("q").len(), 3);

    // The head comes off first
    repo.dagrun()
        .args(["dequeue", "q"])
        .assert()
        .success()
        .stdout(predicates::str::contains("dequeued q:e1 (aborted)"));

    // The two remaining items are still present, in order
    let remaining = repo.queue_items("q");
    assert_eq!(remaining.len(), 2);
    assert!(remaining[0].ends_with("_e2.json"));
    assert!(remaining[1].ends_with("_e3.json"));
}

#[test]
fn targeted_dequeue_removes_a_specific_run() {
    let repo = Repo::new();
    repo.write_dag("q", Repo::single_step_bounded("q", &["true"], 1));

    for run_id in ["e1", "e2", "e3"] {
        enqueue(&repo, "q", run_id);
    }

    repo.dagrun()
        .args(["dequeue", "--dag-run", "q:e2", "q"])
        .assert()
        .success()
        .stdout(predicates::str::contains("dequeued q:e2 (aborted)"));

    let remaining = repo.queue_items("q");
    assert_eq!(remaining.len(), 2);
    assert!(remaining[0].ends_with("_e1.json"));
    assert!(remaining[1].ends_with("_e3.json"));
}

#[test]
fn dequeue_on_empty_queue_fails() {
    let repo = Repo::new();
    repo.dagrun()
        .args(["dequeue", "empty-queue"])
        .assert()
        .code(1)
        .stdout(predicates::str::contains("is empty"));
}

#[test]
fn duplicate_enqueue_is_a_conflict() {
    let repo = Repo::new();
    repo.write_dag("q", Repo::single_step_bounded("q", &["true"], 1));

    enqueue(&repo, "q", "e1");
    repo.dagrun()
        .args(["enqueue", "--workflow-id", "e1", "q"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("already exists"));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dagrun_core::Step;
use dagrun_storage::{ListFilter, ProcError};

struct Fixture {
    _tmp: tempfile::TempDir,
    admission: Admission,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let admission = Admission::new(
        RunStore::new(tmp.path().join("dag-runs")),
        ProcStore::new(tmp.path().join("proc")),
        QueueStore::new(tmp.path().join("queue")),
    );
    Fixture {
        _tmp: tmp,
        admission,
    }
}

fn dag(name: &str, max_active_runs: u32) -> Dag {
    let mut d = Dag::new(name, vec![Step::command("only", vec!["true".into()])]);
    d.max_active_runs = max_active_runs;
    d
}

fn now() -> DateTime<Utc> {
    chrono::Utc::now()
}

fn admit(
    f: &Fixture,
    dag: &Dag,
    run_id: &str,
    opts: AdmitOptions,
) -> Result<Decision, AdmissionError> {
    f.admission
        .admit(dag, &RunId::new(run_id), now(), "", opts)
}

#[test]
fn fresh_run_executes() {
    let f = fixture();
    let d = dag("etl", 0);
    let handle = match admit(&f, &d, "r1", AdmitOptions::default()) {
        Ok(Decision::Execute(handle)) => handle,
        other => panic!("expected Execute, got {:?}", outcome_name(&other)),
    };
    assert_eq!(handle.dag_run().run_id.as_str(), "r1");
    assert_eq!(f.admission.procs().count_alive("etl").unwrap(), 1);
}

#[test]
fn invalid_run_id_is_rejected() {
    let f = fixture();
    let d = dag("etl", 0);
    let err = admit(&f, &d, "bad id", AdmitOptions::default()).unwrap_err();
    assert!(matches!(err, AdmissionError::InvalidRunId(_)));
}

#[test]
fn duplicate_ref_is_already_exists() {
    let f = fixture();
    let d = dag("etl", 0);
    // Record an attempt for (etl, r1) so the conflict check trips
    f.admission
        .runs()
        .create_attempt(&d, now(), &RunId::new("r1"), Default::default())
        .unwrap();

    let err = admit(&f, &d, "r1", AdmitOptions::default()).unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyExists(_)));
    assert!(err.is_refusal());
}

#[test]
fn singleton_fast_fail_with_queue_disabled() {
    let f = fixture();
    let d = dag("single", 1);
    let _handle = match admit(&f, &d, "r1", AdmitOptions::default()).unwrap() {
        Decision::Execute(h) => h,
        Decision::Enqueued(_) => panic!("first run should execute"),
    };

    let err = admit(
        &f,
        &d,
        "r2",
        AdmitOptions {
            queue_disabled: true,
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyRunning(_)));
}

#[test]
fn singleton_overflow_enqueues_when_queues_enabled() {
    let f = fixture();
    let d = dag("single", 1);
    let _handle = match admit(&f, &d, "r1", AdmitOptions::default()).unwrap() {
        Decision::Execute(h) => h,
        Decision::Enqueued(_) => panic!("first run should execute"),
    };

    match admit(&f, &d, "r2", AdmitOptions::default()).unwrap() {
        Decision::Enqueued(r) => assert_eq!(r.run_id.as_str(), "r2"),
        Decision::Execute(_) => panic!("second singleton run must not execute"),
    }

    // The queued attempt is recorded with Queued status
    let statuses = f
        .admission
        .runs()
        .list_statuses(&ListFilter {
            name: Some("single".into()),
            ..Default::default()
        })
        .unwrap();
    let queued = statuses
        .iter()
        .find(|s| s.run_id.as_str() == "r2")
        .unwrap();
    assert_eq!(queued.phase, dagrun_core::Phase::Queued);

    // And the queue holds exactly that run
    let items = f
        .admission
        .queues()
        .list_by_dag_name("single", "single")
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].dag_run.run_id.as_str(), "r2");
}

#[test]
fn released_slot_admits_the_next_run() {
    let f = fixture();
    let d = dag("single", 1);
    let handle = match admit(&f, &d, "r1", AdmitOptions::default()).unwrap() {
        Decision::Execute(h) => h,
        Decision::Enqueued(_) => panic!("first run should execute"),
    };
    handle.stop().unwrap();

    match admit(&f, &d, "r2", AdmitOptions::default()).unwrap() {
        Decision::Execute(_) => {}
        Decision::Enqueued(_) => panic!("slot was free, should execute"),
    }
}

#[test]
fn bounded_pool_enqueues_past_capacity() {
    let f = fixture();
    let d = dag("pool", 2);
    let _h1 = admit(&f, &d, "r1", AdmitOptions::default()).unwrap();
    let _h2 = admit(&f, &d, "r2", AdmitOptions::default()).unwrap();

    match admit(&f, &d, "r3", AdmitOptions::default()).unwrap() {
        Decision::Enqueued(r) => assert_eq!(r.run_id.as_str(), "r3"),
        Decision::Execute(_) => panic!("pool is full"),
    }
}

#[test]
fn named_queue_cap_rejects_queue_full() {
    let f = fixture();
    let mut d = dag("pool", 2);
    d.queue = "batch".into();
    let _h1 = admit(&f, &d, "r1", AdmitOptions::default()).unwrap();
    let _h2 = admit(&f, &d, "r2", AdmitOptions::default()).unwrap();

    // waiting(0) + live(2) >= max(2) already: straight to QueueFull
    let err = admit(&f, &d, "r3", AdmitOptions::default()).unwrap_err();
    assert!(matches!(err, AdmissionError::QueueFull { .. }));
}

#[test]
fn exec_singleton_flag_binds_unbounded_dag() {
    let f = fixture();
    let d = dag("anon", 0);
    let opts = AdmitOptions {
        singleton: true,
        ..Default::default()
    };
    let _h = match admit(&f, &d, "r1", opts).unwrap() {
        Decision::Execute(h) => h,
        Decision::Enqueued(_) => panic!("first run should execute"),
    };

    // With queues disabled the safer default is rejection
    let err = admit(
        &f,
        &d,
        "r2",
        AdmitOptions {
            singleton: true,
            queue_disabled: true,
        },
    )
    .unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyRunning(_)));
}

#[test]
fn contended_group_lock_falls_through_to_queue() {
    let f = fixture();
    let d = dag("etl", 3);
    let _lock = f.admission.procs().try_lock("etl").unwrap();

    match admit(&f, &d, "r1", AdmitOptions::default()).unwrap() {
        Decision::Enqueued(_) => {}
        Decision::Execute(_) => panic!("lock is held, should defer"),
    }
}

#[test]
fn contended_lock_with_queue_disabled_is_max_runs() {
    let f = fixture();
    let d = dag("etl", 3);
    let _lock = f.admission.procs().try_lock("etl").unwrap();

    let err = admit(
        &f,
        &d,
        "r1",
        AdmitOptions {
            queue_disabled: true,
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, AdmissionError::MaxRunsReached { .. }));
}

fn outcome_name(r: &Result<Decision, AdmissionError>) -> String {
    match r {
        Ok(Decision::Execute(_)) => "Execute".into(),
        Ok(Decision::Enqueued(_)) => "Enqueued".into(),
        Err(e) => format!("Err({e})"),
    }
}

// Stale-handle purge feeds the advisory count; a dead pid's slot is
// reclaimed at the next admission rather than leaking forever.
#[test]
fn dead_handle_slot_is_reclaimed() {
    let f = fixture();
    let d = dag("single", 1);
    let handle = match admit(&f, &d, "r1", AdmitOptions::default()).unwrap() {
        Decision::Execute(h) => h,
        Decision::Enqueued(_) => panic!("first run should execute"),
    };

    // Simulate the owner dying: rewrite the entry with an impossible pid
    let entry = dagrun_storage::ProcEntry {
        pid: u32::MAX - 1,
        hostname: dagrun_storage::proc::hostname(),
        dag_name: "single".into(),
        run_id: "r1".into(),
        started_at_ms: 0,
    };
    std::fs::write(handle.path(), serde_json::to_vec(&entry).unwrap()).unwrap();
    std::mem::forget(handle); // owner is "gone", no Drop cleanup

    match admit(&f, &d, "r2", AdmitOptions::default()).unwrap() {
        Decision::Execute(_) => {}
        Decision::Enqueued(_) => panic!("stale slot should have been purged"),
    }
}

#[test]
fn lock_contention_error_is_distinct() {
    let f = fixture();
    let _lock = f.admission.procs().try_lock("g").unwrap();
    assert!(matches!(
        f.admission.procs().try_lock("g"),
        Err(ProcError::Contended(_))
    ));
}

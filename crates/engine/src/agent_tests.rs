// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dagrun_core::RunId;

/// Sink collecting every emitted snapshot in memory.
struct CollectSink {
    emitted: Vec<Status>,
}

#[async_trait]
impl StatusSink for CollectSink {
    async fn emit(&mut self, status: &Status) -> Result<(), AgentError> {
        self.emitted.push(status.clone());
        Ok(())
    }
}

fn cfg(tmp: &tempfile::TempDir) -> AgentConfig {
    AgentConfig {
        log_dir: tmp.path().join("logs"),
        shell: None,
        step_filter: None,
    }
}

fn run_status(dag: &Dag) -> Status {
    Status::initial(dag, RunId::new("r1"), Phase::NotStarted)
}

async fn execute(dag: &Dag, cfg: &AgentConfig) -> (Phase, Vec<Status>) {
    let mut status = run_status(dag);
    let mut sink = CollectSink { emitted: vec![] };
    let (_stop_tx, mut stop_rx) = watch::channel(false);
    let phase = execute_run(dag, &mut status, &mut sink, &mut stop_rx, cfg)
        .await
        .unwrap();
    (phase, sink.emitted)
}

#[tokio::test]
async fn all_steps_succeed() {
    let tmp = tempfile::tempdir().unwrap();
    let dag = Dag::new(
        "ok",
        vec![
            Step::command("a", vec!["true".into()]),
            Step {
                depends: vec!["a".into()],
                ..Step::command("b", vec!["true".into()])
            },
        ],
    );

    let (phase, emitted) = execute(&dag, &cfg(&tmp)).await;
    assert_eq!(phase, Phase::Succeeded);

    let last = emitted.last().unwrap();
    assert!(last.nodes.iter().all(|n| n.phase == NodePhase::Succeeded));
    assert!(last.started_at.is_some());
    assert!(last.finished_at.is_some());
    assert_eq!(last.pid, Some(std::process::id()));
}

#[tokio::test]
async fn failing_step_fails_the_run_and_skips_dependents() {
    let tmp = tempfile::tempdir().unwrap();
    let dag = Dag::new(
        "bad",
        vec![
            Step::command("a", vec!["false".into()]),
            Step {
                depends: vec!["a".into()],
                ..Step::command("b", vec!["true".into()])
            },
        ],
    );

    let (phase, emitted) = execute(&dag, &cfg(&tmp)).await;
    assert_eq!(phase, Phase::Failed);

    let last = emitted.last().unwrap();
    assert_eq!(last.node("a").unwrap().phase, NodePhase::Failed);
    assert_eq!(last.node("b").unwrap().phase, NodePhase::Skipped);
    assert!(last.error.as_deref().unwrap().contains("step a failed"));
}

#[tokio::test]
async fn tolerated_failure_is_partial_success() {
    let tmp = tempfile::tempdir().unwrap();
    let dag = Dag::new(
        "soft",
        vec![
            Step {
                continue_on_failure: true,
                ..Step::command("flaky", vec!["false".into()])
            },
            Step::command("solid", vec!["true".into()]),
        ],
    );

    let (phase, _) = execute(&dag, &cfg(&tmp)).await;
    assert_eq!(phase, Phase::PartiallySucceeded);
}

#[tokio::test]
async fn step_output_is_captured_to_log_files() {
    let tmp = tempfile::tempdir().unwrap();
    let config = cfg(&tmp);
    let dag = Dag::new(
        "echo",
        vec![Step {
            shell: Some("sh".into()),
            ..Step::command("say", vec!["echo hello-dagrun".into()])
        }],
    );

    let (phase, emitted) = execute(&dag, &config).await;
    assert_eq!(phase, Phase::Succeeded);

    let node = emitted.last().unwrap().node("say").unwrap().clone();
    let stdout = std::fs::read_to_string(node.stdout_path.unwrap()).unwrap();
    assert_eq!(stdout.trim(), "hello-dagrun");
}

#[tokio::test]
async fn stop_flag_aborts_the_run_and_runs_cancel_handler() {
    let tmp = tempfile::tempdir().unwrap();
    let mut dag = Dag::new(
        "slow",
        vec![Step::command("sleepy", vec!["sleep".into(), "30".into()])],
    );
    dag.handlers.on_cancel = Some(Step::command("cleanup", vec!["true".into()]));

    let mut status = run_status(&dag);
    let mut sink = CollectSink { emitted: vec![] };
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let config = cfg(&tmp);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = stop_tx.send(true);
    });

    let phase = execute_run(&dag, &mut status, &mut sink, &mut stop_rx, &config)
        .await
        .unwrap();
    stopper.await.unwrap();

    assert_eq!(phase, Phase::Aborted);
    let last = sink.emitted.last().unwrap();
    assert_eq!(last.node("sleepy").unwrap().phase, NodePhase::Aborted);
    assert_eq!(
        last.on_cancel.as_ref().unwrap().phase,
        NodePhase::Succeeded
    );
}

#[tokio::test]
async fn failure_handler_runs_on_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let mut dag = Dag::new("bad", vec![Step::command("a", vec!["false".into()])]);
    dag.handlers.on_failure = Some(Step::command("notify", vec!["true".into()]));
    dag.handlers.on_exit = Some(Step::command("always", vec!["true".into()]));

    let (phase, emitted) = execute(&dag, &cfg(&tmp)).await;
    assert_eq!(phase, Phase::Failed);

    let last = emitted.last().unwrap();
    assert_eq!(last.on_failure.as_ref().unwrap().phase, NodePhase::Succeeded);
    assert_eq!(last.on_exit.as_ref().unwrap().phase, NodePhase::Succeeded);
}

#[tokio::test]
async fn failing_exit_handler_fails_a_green_run() {
    let tmp = tempfile::tempdir().unwrap();
    let mut dag = Dag::new("ok", vec![Step::command("a", vec!["true".into()])]);
    dag.handlers.on_exit = Some(Step::command("broken", vec!["false".into()]));

    let (phase, _) = execute(&dag, &cfg(&tmp)).await;
    assert_eq!(phase, Phase::Failed);
}

#[tokio::test]
async fn step_filter_runs_only_that_step() {
    let tmp = tempfile::tempdir().unwrap();
    let dag = Dag::new(
        "pick",
        vec![
            Step::command("a", vec!["true".into()]),
            Step::command("b", vec!["true".into()]),
        ],
    );

    let mut status = run_status(&dag);
    // Seeded from a previous attempt: a succeeded, b failed
    status.node_mut("a").unwrap().phase = NodePhase::Succeeded;
    status.node_mut("b").unwrap().phase = NodePhase::Failed;

    let mut sink = CollectSink { emitted: vec![] };
    let (_stop_tx, mut stop_rx) = watch::channel(false);
    let config = AgentConfig {
        step_filter: Some("b".into()),
        ..cfg(&tmp)
    };

    let phase = execute_run(&dag, &mut status, &mut sink, &mut stop_rx, &config)
        .await
        .unwrap();
    assert_eq!(phase, Phase::Succeeded);
    assert_eq!(status.node("b").unwrap().retry_count, 0);
    assert_eq!(status.node("a").unwrap().phase, NodePhase::Succeeded);
}

#[tokio::test]
async fn unknown_step_filter_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let dag = Dag::new("pick", vec![Step::command("a", vec!["true".into()])]);

    let mut status = run_status(&dag);
    let mut sink = CollectSink { emitted: vec![] };
    let (_stop_tx, mut stop_rx) = watch::channel(false);
    let config = AgentConfig {
        step_filter: Some("nope".into()),
        ..cfg(&tmp)
    };

    let err = execute_run(&dag, &mut status, &mut sink, &mut stop_rx, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnknownStep(_)));
}

#[tokio::test]
async fn phases_emitted_in_monotone_order() {
    let tmp = tempfile::tempdir().unwrap();
    let dag = Dag::new("ok", vec![Step::command("a", vec!["true".into()])]);

    let (_, emitted) = execute(&dag, &cfg(&tmp)).await;
    let mut last_rank = 0;
    for status in &emitted {
        assert!(status.phase.rank() >= last_rank, "phase regressed");
        last_rank = status.phase.rank();
    }
}

mod local_runner {
    use super::*;
    use dagrun_storage::{CreateOptions, RunStore};

    #[tokio::test]
    async fn run_finalizes_attempt_and_releases_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let runs = RunStore::new(tmp.path().join("dag-runs"));
        let procs = ProcStore::new(tmp.path().join("proc"));
        let dag = Dag::new("ok", vec![Step::command("a", vec!["true".into()])]);
        let run_id = RunId::new("r1");

        let attempt = runs
            .create_attempt(&dag, chrono::Utc::now(), &run_id, CreateOptions::default())
            .unwrap();
        let handle = procs
            .acquire(dag.proc_group(), &attempt.dag_run())
            .unwrap();
        let status = Status::initial(&dag, run_id, Phase::NotStarted);

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let runner = LocalRunner::new(procs.clone());
        let phase = runner
            .run(
                &dag,
                &attempt,
                handle,
                status,
                AgentConfig {
                    log_dir: tmp.path().join("logs"),
                    ..Default::default()
                },
                cancel_rx,
            )
            .await
            .unwrap();

        assert_eq!(phase, Phase::Succeeded);
        assert!(attempt.is_closed());
        assert_eq!(procs.count_alive("ok").unwrap(), 0);
        assert_eq!(
            attempt.latest_status().unwrap().unwrap().phase,
            Phase::Succeeded
        );
        // Control socket is gone after the run
        assert!(!procs.socket_path("ok", "r1").exists());
    }

    #[tokio::test]
    async fn failed_run_still_finalizes() {
        let tmp = tempfile::tempdir().unwrap();
        let runs = RunStore::new(tmp.path().join("dag-runs"));
        let procs = ProcStore::new(tmp.path().join("proc"));
        let dag = Dag::new("bad", vec![Step::command("a", vec!["false".into()])]);
        let run_id = RunId::new("r1");

        let attempt = runs
            .create_attempt(&dag, chrono::Utc::now(), &run_id, CreateOptions::default())
            .unwrap();
        let handle = procs
            .acquire(dag.proc_group(), &attempt.dag_run())
            .unwrap();
        let status = Status::initial(&dag, run_id, Phase::NotStarted);

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let runner = LocalRunner::new(procs.clone());
        let phase = runner
            .run(
                &dag,
                &attempt,
                handle,
                status,
                AgentConfig {
                    log_dir: tmp.path().join("logs"),
                    ..Default::default()
                },
                cancel_rx,
            )
            .await
            .unwrap();

        assert_eq!(phase, Phase::Failed);
        assert!(attempt.is_closed());
        assert_eq!(procs.count_alive("bad").unwrap(), 0);
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dagrun_core::{Dag, Phase, RunId, Step};

fn status(phase: Phase) -> Status {
    let dag = Dag::new("etl", vec![Step::command("only", vec!["true".into()])]);
    Status::initial(&dag, RunId::new("r1"), phase)
}

#[tokio::test]
async fn status_query_returns_live_value() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("run.sock");
    let (stop_tx, _stop_rx) = watch::channel(false);
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let server = ControlServer::bind(&path, status(Phase::Running), stop_tx).unwrap();
    let cell = server.status_cell();
    tokio::spawn(server.serve(cancel_rx));

    let live = query_status(&path).await.unwrap();
    assert_eq!(live.phase, Phase::Running);

    // Agent-side update is visible on the next query
    cell.lock().phase = Phase::Succeeded;
    let live = query_status(&path).await.unwrap();
    assert_eq!(live.phase, Phase::Succeeded);
}

#[tokio::test]
async fn stop_sets_the_flag_and_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("run.sock");
    let (stop_tx, stop_rx) = watch::channel(false);
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let server = ControlServer::bind(&path, status(Phase::Running), stop_tx).unwrap();
    tokio::spawn(server.serve(cancel_rx));

    send_stop(&path).await.unwrap();
    assert!(*stop_rx.borrow());
    send_stop(&path).await.unwrap();
    assert!(*stop_rx.borrow());
}

#[tokio::test]
async fn cancel_tears_down_the_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("run.sock");
    let (stop_tx, _stop_rx) = watch::channel(false);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let server = ControlServer::bind(&path, status(Phase::Running), stop_tx).unwrap();
    let task = tokio::spawn(server.serve(cancel_rx));
    assert!(path.exists());

    cancel_tx.send(true).unwrap();
    task.await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn query_on_dead_socket_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("gone.sock");
    assert!(query_status(&path).await.is_err());
}

#[tokio::test]
async fn bind_replaces_stale_socket_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("run.sock");
    std::fs::write(&path, b"stale").unwrap();

    let (stop_tx, _stop_rx) = watch::channel(false);
    let server = ControlServer::bind(&path, status(Phase::Running), stop_tx);
    assert!(server.is_ok());
}

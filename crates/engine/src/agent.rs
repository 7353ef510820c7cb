// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The local run agent: executes one attempt end to end.
//!
//! Steps run sequentially in definition order, gated on their dependencies.
//! Every node transition appends a status line through the sink, so the
//! JSONL tail is always current. The agent honors a cooperative stop flag
//! at its suspension points: the running child is killed, the cancel
//! handler runs, and the attempt finalizes as Aborted.

use crate::error::AgentError;
use crate::sock::ControlServer;
use async_trait::async_trait;
use chrono::Utc;
use dagrun_core::{Dag, NodePhase, Phase, Status, Step};
use dagrun_storage::{proc, Attempt, AttemptWriter, ProcHandle, ProcStore};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Heartbeat interval for the proc handle while a run executes.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Where status snapshots go as the run progresses.
#[async_trait]
pub trait StatusSink: Send {
    async fn emit(&mut self, status: &Status) -> Result<(), AgentError>;
}

/// Sink writing to the attempt log and mirroring into the control socket's
/// shared cell, with an optional observer channel (workers stream these to
/// the coordinator).
pub struct AttemptSink {
    writer: AttemptWriter,
    cell: Option<Arc<Mutex<Status>>>,
    observer: Option<tokio::sync::mpsc::UnboundedSender<Status>>,
}

impl AttemptSink {
    pub fn new(writer: AttemptWriter, cell: Option<Arc<Mutex<Status>>>) -> Self {
        Self {
            writer,
            cell,
            observer: None,
        }
    }

    pub fn with_observer(mut self, tx: tokio::sync::mpsc::UnboundedSender<Status>) -> Self {
        self.observer = Some(tx);
        self
    }

    pub fn into_writer(self) -> AttemptWriter {
        self.writer
    }
}

#[async_trait]
impl StatusSink for AttemptSink {
    async fn emit(&mut self, status: &Status) -> Result<(), AgentError> {
        self.writer.write(status)?;
        if let Some(cell) = &self.cell {
            *cell.lock() = status.clone();
        }
        if let Some(observer) = &self.observer {
            let _ = observer.send(status.clone());
        }
        Ok(())
    }
}

/// Execution knobs for one attempt.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    /// Directory for per-step stdout/stderr files.
    pub log_dir: PathBuf,
    /// Shell to wrap commands in when the step names none.
    pub shell: Option<String>,
    /// Re-execute only this step (retry `--step`); other nodes keep their
    /// seeded phases.
    pub step_filter: Option<String>,
}

enum StepResult {
    Succeeded,
    Failed(String),
    Aborted,
}

/// Run the DAG's steps, mutating and emitting `status` as nodes transition.
///
/// Returns the terminal phase. The caller owns finalize (closing the
/// attempt) and slot release.
pub async fn execute_run(
    dag: &Dag,
    status: &mut Status,
    sink: &mut dyn StatusSink,
    stop_rx: &mut watch::Receiver<bool>,
    cfg: &AgentConfig,
) -> Result<Phase, AgentError> {
    std::fs::create_dir_all(&cfg.log_dir)?;

    status.phase = Phase::Running;
    status.started_at = Some(Utc::now());
    status.pid = Some(std::process::id());
    status.log_path = Some(cfg.log_dir.display().to_string());
    sink.emit(status).await?;

    if let Some(filter) = &cfg.step_filter {
        if !dag.steps.contains_key(filter) {
            return Err(AgentError::UnknownStep(filter.clone()));
        }
    }

    let mut cancelled = *stop_rx.borrow();
    for (name, step) in &dag.steps {
        if let Some(filter) = &cfg.step_filter {
            if name != filter {
                continue;
            }
        }
        if cancelled {
            set_node(status, name, |n| {
                n.phase = NodePhase::Aborted;
                n.finished_at = Some(Utc::now());
            });
            sink.emit(status).await?;
            continue;
        }

        // Dependency gate: every dependency must have succeeded
        let blocked = step.depends.iter().any(|dep| {
            status
                .node(dep)
                .map_or(true, |n| n.phase != NodePhase::Succeeded)
        });
        if blocked {
            debug!(step = %name, "skipping step with unmet dependencies");
            set_node(status, name, |n| n.phase = NodePhase::Skipped);
            sink.emit(status).await?;
            continue;
        }

        match run_step(name, step, status, sink, stop_rx, cfg).await? {
            StepResult::Succeeded => {}
            StepResult::Failed(_) => {}
            StepResult::Aborted => cancelled = true,
        }
    }

    let phase = settle_phase(dag, status, cancelled);

    // Lifecycle handlers: the phase-specific one, then on_exit
    let phase_handler = match phase {
        Phase::Succeeded => dag.handlers.on_success.as_ref(),
        Phase::Aborted => dag.handlers.on_cancel.as_ref(),
        _ => dag.handlers.on_failure.as_ref(),
    };
    let mut handler_failed = false;
    if let Some(step) = phase_handler {
        handler_failed |= run_handler(step, status, sink, cfg).await?;
    }
    if let Some(step) = &dag.handlers.on_exit {
        handler_failed |= run_handler(step, status, sink, cfg).await?;
    }

    let final_phase = if handler_failed && phase == Phase::Succeeded {
        Phase::Failed
    } else {
        phase
    };

    status.phase = final_phase;
    status.finished_at = Some(Utc::now());
    sink.emit(status).await?;
    info!(dag = %dag.name, run_id = %status.run_id, phase = %final_phase, "run finished");
    Ok(final_phase)
}

/// Derive the run phase from the settled node states.
fn settle_phase(dag: &Dag, status: &Status, cancelled: bool) -> Phase {
    if cancelled {
        return Phase::Aborted;
    }
    let mut soft_failure = false;
    for node in &status.nodes {
        if node.phase == NodePhase::Failed {
            let tolerated = dag
                .steps
                .get(node.step.as_str())
                .map_or(false, |s| s.continue_on_failure);
            if tolerated {
                soft_failure = true;
            } else {
                return Phase::Failed;
            }
        }
        if node.phase == NodePhase::Skipped {
            // A skip means a dependency failed upstream
            soft_failure = true;
        }
    }
    if soft_failure {
        Phase::PartiallySucceeded
    } else {
        Phase::Succeeded
    }
}

/// Execute one step, updating its node through the sink.
async fn run_step(
    name: &str,
    step: &Step,
    status: &mut Status,
    sink: &mut dyn StatusSink,
    stop_rx: &mut watch::Receiver<bool>,
    cfg: &AgentConfig,
) -> Result<StepResult, AgentError> {
    let stdout_path = cfg.log_dir.join(format!("{}.stdout.log", safe_step(name)));
    let stderr_path = cfg.log_dir.join(format!("{}.stderr.log", safe_step(name)));

    set_node(status, name, |n| {
        n.phase = NodePhase::Running;
        n.started_at = Some(Utc::now());
        n.stdout_path = Some(stdout_path.display().to_string());
        n.stderr_path = Some(stderr_path.display().to_string());
        if n.done_count > 0 || n.finished_at.is_some() {
            n.retry_count += 1;
        }
        n.finished_at = None;
        n.error = None;
    });
    sink.emit(status).await?;

    let result = spawn_and_wait(step, &stdout_path, &stderr_path, cfg, stop_rx).await;

    let result = match result {
        Ok(r) => r,
        Err(e) => StepResult::Failed(e.to_string()),
    };
    set_node(status, name, |n| {
        n.finished_at = Some(Utc::now());
        match &result {
            StepResult::Succeeded => {
                n.phase = NodePhase::Succeeded;
                n.done_count += 1;
            }
            StepResult::Failed(message) => {
                n.phase = NodePhase::Failed;
                n.error = Some(message.clone());
            }
            StepResult::Aborted => n.phase = NodePhase::Aborted,
        }
    });
    if let StepResult::Failed(message) = &result {
        warn!(step = %name, error = %message, "step failed");
        status.error = Some(format!("step {name} failed: {message}"));
    }
    sink.emit(status).await?;
    Ok(result)
}

/// Run a handler step, recording into the matching handler node. Handlers
/// run to completion even under cancellation. Returns true on failure.
async fn run_handler(
    step: &Step,
    status: &mut Status,
    sink: &mut dyn StatusSink,
    cfg: &AgentConfig,
) -> Result<bool, AgentError> {
    let stdout_path = cfg
        .log_dir
        .join(format!("{}.stdout.log", safe_step(&step.name)));
    let stderr_path = cfg
        .log_dir
        .join(format!("{}.stderr.log", safe_step(&step.name)));

    set_handler_node(status, &step.name, |n| {
        n.phase = NodePhase::Running;
        n.started_at = Some(Utc::now());
        n.stdout_path = Some(stdout_path.display().to_string());
        n.stderr_path = Some(stderr_path.display().to_string());
    });
    sink.emit(status).await?;

    // A channel nobody signals: the handler ignores the run's stop flag
    let (_quiet_tx, mut quiet_rx) = watch::channel(false);
    let result = spawn_and_wait(step, &stdout_path, &stderr_path, cfg, &mut quiet_rx).await;

    let failed = !matches!(result, Ok(StepResult::Succeeded));
    set_handler_node(status, &step.name, |n| {
        n.finished_at = Some(Utc::now());
        n.phase = if failed {
            NodePhase::Failed
        } else {
            NodePhase::Succeeded
        };
        if let Ok(StepResult::Failed(message)) = &result {
            n.error = Some(message.clone());
        }
    });
    sink.emit(status).await?;
    Ok(failed)
}

async fn spawn_and_wait(
    step: &Step,
    stdout_path: &std::path::Path,
    stderr_path: &std::path::Path,
    cfg: &AgentConfig,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<StepResult, AgentError> {
    let mut command = build_command(step, cfg)?;
    command
        .stdout(Stdio::from(std::fs::File::create(stdout_path)?))
        .stderr(Stdio::from(std::fs::File::create(stderr_path)?))
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    loop {
        tokio::select! {
            exit = child.wait() => {
                return Ok(exit_result(exit?));
            }
            changed = stop_rx.changed() => {
                if changed.is_ok() {
                    if *stop_rx.borrow() {
                        let _ = child.kill().await;
                        return Ok(StepResult::Aborted);
                    }
                } else {
                    // Stop sender is gone; no stop can arrive anymore
                    return Ok(exit_result(child.wait().await?));
                }
            }
        }
    }
}

fn exit_result(exit: std::process::ExitStatus) -> StepResult {
    if exit.success() {
        StepResult::Succeeded
    } else {
        StepResult::Failed(format!("exit status {}", exit.code().unwrap_or(-1)))
    }
}

fn build_command(step: &Step, cfg: &AgentConfig) -> Result<tokio::process::Command, AgentError> {
    if step.command.is_empty() {
        return Err(AgentError::EmptyCommand {
            step: step.name.clone(),
        });
    }
    let shell = step.shell.as_deref().or(cfg.shell.as_deref());
    let mut command = match shell {
        Some(shell) => {
            let mut c = tokio::process::Command::new(shell);
            c.arg("-c").arg(step.command.join(" "));
            c
        }
        None => {
            let mut c = tokio::process::Command::new(&step.command[0]);
            c.args(&step.command[1..]);
            c
        }
    };
    if let Some(workdir) = &step.workdir {
        command.current_dir(workdir);
    }
    for pair in &step.env {
        if let Some((key, value)) = pair.split_once('=') {
            command.env(key, value);
        }
    }
    Ok(command)
}

fn set_node(status: &mut Status, step: &str, f: impl FnOnce(&mut dagrun_core::Node)) {
    if let Some(node) = status.node_mut(step) {
        f(node);
    }
}

fn set_handler_node(status: &mut Status, name: &str, f: impl FnOnce(&mut dagrun_core::Node)) {
    for slot in [
        &mut status.on_success,
        &mut status.on_failure,
        &mut status.on_cancel,
        &mut status.on_exit,
    ] {
        if let Some(node) = slot {
            if node.step == name {
                f(node);
                return;
            }
        }
    }
}

fn safe_step(name: &str) -> String {
    dagrun_core::safe_name(name)
}

/// Runs one admitted attempt locally: control socket, heartbeat, execution,
/// finalize, and slot release on every exit path.
pub struct LocalRunner {
    procs: ProcStore,
    observer: Option<tokio::sync::mpsc::UnboundedSender<Status>>,
}

impl LocalRunner {
    pub fn new(procs: ProcStore) -> Self {
        Self {
            procs,
            observer: None,
        }
    }

    /// Mirror every emitted status into the given channel.
    pub fn with_observer(mut self, tx: tokio::sync::mpsc::UnboundedSender<Status>) -> Self {
        self.observer = Some(tx);
        self
    }

    /// Drive the attempt to a terminal phase.
    pub async fn run(
        &self,
        dag: &Dag,
        attempt: &Attempt,
        handle: ProcHandle,
        mut status: Status,
        cfg: AgentConfig,
        cancel: watch::Receiver<bool>,
    ) -> Result<Phase, AgentError> {
        let writer = attempt.open()?;

        // Stop flag: set by the control socket, by process signals, or by
        // the caller's cancel token
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut cancel_bridge = cancel.clone();
        let bridge_tx = stop_tx.clone();
        let bridge = tokio::spawn(async move {
            if cancel_bridge.changed().await.is_ok() && *cancel_bridge.borrow() {
                let _ = bridge_tx.send(true);
            }
        });

        // Per-run control socket
        let sock_path = self
            .procs
            .socket_path(dag.proc_group(), status.run_id.as_str());
        let (server_cancel_tx, server_cancel_rx) = watch::channel(false);
        let server = ControlServer::bind(&sock_path, status.clone(), stop_tx.clone())
            .map_err(|e| AgentError::Control(e.to_string()))?;
        let cell = server.status_cell();
        let server_task = tokio::spawn(server.serve(server_cancel_rx));

        // Handle heartbeat keeps the slot visibly alive
        let heartbeat_path = handle.path().to_owned();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            ticker.tick().await; // immediate first tick is a no-op
            loop {
                ticker.tick().await;
                if let Err(e) = proc::touch_handle(&heartbeat_path) {
                    warn!(error = %e, "proc handle heartbeat failed");
                }
            }
        });

        let mut sink = AttemptSink::new(writer, Some(cell));
        if let Some(observer) = &self.observer {
            sink = sink.with_observer(observer.clone());
        }
        let outcome = execute_run(dag, &mut status, &mut sink, &mut stop_rx, &cfg).await;

        heartbeat.abort();
        bridge.abort();
        let _ = server_cancel_tx.send(true);
        let _ = server_task.await;

        let phase = match outcome {
            Ok(phase) => phase,
            Err(e) => {
                // The store never swallows the failure: record it, finalize,
                // then surface the error
                status.phase = Phase::Failed;
                status.finished_at = Some(Utc::now());
                status.error = Some(e.to_string());
                let _ = sink.emit(&status).await;
                let _ = sink.into_writer().close();
                let _ = handle.stop();
                return Err(e);
            }
        };

        sink.into_writer().close()?;
        handle.stop()?;
        Ok(phase)
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

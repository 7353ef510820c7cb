// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker agent: N concurrent pollers claiming tasks and executing
//! them locally.
//!
//! In the default mode a claimed task goes through exactly the local
//! admission → proc handle → run-record path, so the worker's filesystem is
//! authoritative for its own runs; status updates additionally stream to
//! the coordinator. In shared-nothing mode nothing touches local stores:
//! the DAG comes from the task payload and the status history lives in the
//! coordinator stream alone.

use crate::client::{Backoff, CoordinatorClient};
use crate::proto::{StatusUpdate, Task};
use async_trait::async_trait;
use dagrun_core::{Phase, RunId, Status, Trigger};
use dagrun_engine::{
    execute_run, AdmitOptions, AgentConfig, AgentError, LocalRunner, ManagerError, RunManager,
    StartOutcome, StatusSink,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Default long-poll window.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default grace period for in-flight runs on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Advertised id; defaults to `hostname@pid`.
    pub worker_id: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Poller count = concurrent runs.
    pub max_active_runs: usize,
    pub poll_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Execute purely from the task payload; touch no local store.
    pub shared_nothing: bool,
    /// Root for per-run log directories.
    pub log_root: PathBuf,
    pub shell: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            labels: BTreeMap::new(),
            max_active_runs: 1,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            shared_nothing: false,
            log_root: PathBuf::from("logs"),
            shell: None,
        }
    }
}

impl WorkerConfig {
    pub fn effective_worker_id(&self) -> String {
        self.worker_id.clone().unwrap_or_else(|| {
            format!(
                "{}@{}",
                dagrun_storage::proc::hostname(),
                std::process::id()
            )
        })
    }
}

/// The worker agent.
pub struct Worker {
    client: CoordinatorClient,
    manager: RunManager,
    cfg: WorkerConfig,
}

impl Worker {
    pub fn new(client: CoordinatorClient, manager: RunManager, cfg: WorkerConfig) -> Self {
        Self {
            client,
            manager,
            cfg,
        }
    }

    /// Poll and execute until cancelled, then drain in-flight runs up to
    /// the shutdown timeout.
    pub async fn run(self, cancel: watch::Receiver<bool>) {
        let worker_id = self.cfg.effective_worker_id();
        info!(
            worker_id = %worker_id,
            pollers = self.cfg.max_active_runs.max(1),
            shared_nothing = self.cfg.shared_nothing,
            "worker starting"
        );

        let mut pollers = Vec::new();
        for n in 0..self.cfg.max_active_runs.max(1) {
            let poller = Poller {
                client: self.client.clone(),
                manager: self.manager.clone(),
                cfg: self.cfg.clone(),
                worker_id: worker_id.clone(),
                poller_id: format!("{worker_id}#{n}"),
            };
            pollers.push(tokio::spawn(poller.run(cancel.clone())));
        }

        // Pollers stop accepting work as soon as cancel fires; what remains
        // is draining whatever is still executing
        let drain = async {
            for poller in pollers {
                let _ = poller.await;
            }
        };
        let mut shutdown_watch = cancel.clone();
        tokio::pin!(drain);
        tokio::select! {
            _ = &mut drain => {}
            _ = async {
                // Arm the drain deadline only once shutdown begins
                loop {
                    if *shutdown_watch.borrow() {
                        break;
                    }
                    if shutdown_watch.changed().await.is_err() {
                        break;
                    }
                }
                tokio::time::sleep(self.cfg.shutdown_timeout).await;
            } => {
                warn!(timeout = ?self.cfg.shutdown_timeout, "shutdown timeout elapsed, abandoning in-flight runs");
            }
        }
        info!(worker_id = %worker_id, "worker stopped");
    }
}

struct Poller {
    client: CoordinatorClient,
    manager: RunManager,
    cfg: WorkerConfig,
    worker_id: String,
    poller_id: String,
}

impl Poller {
    async fn run(self, mut cancel: watch::Receiver<bool>) {
        let mut backoff = Backoff::default();
        loop {
            if *cancel.borrow() {
                break;
            }

            let polled = tokio::select! {
                polled = self.client.poll(
                    &self.worker_id,
                    &self.poller_id,
                    &self.cfg.labels,
                    self.cfg.poll_timeout,
                ) => polled,
                changed = cancel.changed() => {
                    if changed.is_err() {
                        // Cancel source is gone; treat as shutdown
                        break;
                    }
                    continue;
                }
            };

            match polled {
                Ok(Some(task)) => {
                    backoff.reset();
                    if let Err(e) = self.client.ack(&task.task_id, &self.worker_id).await {
                        warn!(task_id = %task.task_id, error = %e, "ack failed, dropping task");
                        continue;
                    }
                    self.execute(task, cancel.clone()).await;
                }
                Ok(None) => backoff.reset(),
                Err(e) if e.is_transient() => {
                    let delay = backoff.next_delay();
                    debug!(error = %e, delay_ms = delay.as_millis() as u64, "poll failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.changed() => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "poll refused, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff.next_delay()) => {}
                        _ = cancel.changed() => {}
                    }
                }
            }
        }
    }

    async fn execute(&self, task: Task, cancel: watch::Receiver<bool>) {
        info!(task_id = %task.task_id, dag_run = %task.dag_run, "executing task");
        let result = if self.cfg.shared_nothing {
            self.execute_shared_nothing(&task, cancel).await
        } else {
            self.execute_local(&task, cancel).await
        };
        if let Err(e) = result {
            error!(task_id = %task.task_id, error = %e, "task execution failed");
            // Surface the failure on the stream so the dispatcher sees a
            // terminal state
            let mut status = Status::initial(
                &task.dag,
                task.dag_run.run_id.clone(),
                Phase::Failed,
            );
            status.worker_id = Some(self.worker_id.clone());
            status.error = Some(e.to_string());
            let _ = self
                .client
                .report(StatusUpdate {
                    task_id: task.task_id.clone(),
                    status,
                })
                .await;
        }
    }

    /// Default mode: the same admission → handle → record path as a local
    /// start, plus streaming.
    async fn execute_local(
        &self,
        task: &Task,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), ManagerError> {
        let outcome = self.manager.start_run(
            &task.dag,
            Some(task.dag_run.run_id.clone()),
            &task.params,
            Trigger::Manual,
            AdmitOptions {
                queue_disabled: true,
                singleton: false,
            },
        );

        let (attempt, handle, mut status) = match outcome {
            Ok(StartOutcome::Execute {
                attempt,
                handle,
                status,
            }) => (attempt, handle, status),
            Ok(StartOutcome::Enqueued(dag_run)) => {
                // queue_disabled makes this unreachable; report as claimed-but-deferred
                warn!(dag_run = %dag_run, "dispatched run was enqueued locally");
                return Ok(());
            }
            Err(ManagerError::Admission(e)) if e.is_refusal() => {
                // Re-delivery of a task this worker (or a peer on the same
                // filesystem) already ran: report the recorded state
                debug!(task_id = %task.task_id, error = %e, "duplicate delivery, reporting stored status");
                let status = self.manager.current_status(&task.dag_run).await?;
                let _ = self
                    .client
                    .report(StatusUpdate {
                        task_id: task.task_id.clone(),
                        status,
                    })
                    .await;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        status.worker_id = Some(self.worker_id.clone());

        let (observer_tx, observer_rx) = tokio::sync::mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_reports(
            self.client.clone(),
            task.task_id.clone(),
            observer_rx,
        ));

        let runner = LocalRunner::new(self.manager.admission().procs().clone())
            .with_observer(observer_tx);
        let cfg = AgentConfig {
            log_dir: self
                .cfg
                .log_root
                .join(dagrun_core::safe_name(&task.dag.name))
                .join(task.dag_run.run_id.as_str()),
            shell: self.cfg.shell.clone(),
            step_filter: None,
        };
        let outcome = runner
            .run(&task.dag, &attempt, handle, status, cfg, cancel)
            .await;
        let _ = forwarder.await;
        outcome.map(|_| ()).map_err(ManagerError::from)
    }

    /// Shared-nothing: the payload is the DAG; reports are the only record.
    async fn execute_shared_nothing(
        &self,
        task: &Task,
        cancel: watch::Receiver<bool>,
    ) -> Result<(), ManagerError> {
        let mut status = Status::initial(
            &task.dag,
            RunId::new(task.dag_run.run_id.as_str()),
            Phase::NotStarted,
        );
        status.params = task.params.clone();
        status.worker_id = Some(self.worker_id.clone());

        let mut sink = ReportSink {
            client: self.client.clone(),
            task_id: task.task_id.clone(),
        };
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut bridge = cancel.clone();
        let bridge_task = tokio::spawn(async move {
            if bridge.changed().await.is_ok() && *bridge.borrow() {
                let _ = stop_tx.send(true);
            }
        });

        let cfg = AgentConfig {
            log_dir: self
                .cfg
                .log_root
                .join(dagrun_core::safe_name(&task.dag.name))
                .join(task.dag_run.run_id.as_str()),
            shell: self.cfg.shell.clone(),
            step_filter: None,
        };
        let result = execute_run(&task.dag, &mut status, &mut sink, &mut stop_rx, &cfg).await;
        bridge_task.abort();
        result.map(|_| ()).map_err(ManagerError::from)
    }
}

/// Stream observed statuses to the coordinator, idempotent on the task id.
async fn forward_reports(
    client: CoordinatorClient,
    task_id: String,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Status>,
) {
    while let Some(status) = rx.recv().await {
        if let Err(e) = client
            .report(StatusUpdate {
                task_id: task_id.clone(),
                status,
            })
            .await
        {
            warn!(task_id = %task_id, error = %e, "status report failed");
        }
    }
}

/// Sink reporting straight to the coordinator (shared-nothing mode).
struct ReportSink {
    client: CoordinatorClient,
    task_id: String,
}

#[async_trait]
impl StatusSink for ReportSink {
    async fn emit(&mut self, status: &Status) -> Result<(), AgentError> {
        if let Err(e) = self
            .client
            .report(StatusUpdate {
                task_id: self.task_id.clone(),
                status: status.clone(),
            })
            .await
        {
            // Reports are at-least-once; a lost intermediate update is
            // recovered by the next one
            warn!(task_id = %self.task_id, error = %e, "status report failed");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run manager: the facade CLI drivers and the scheduler drive.
//!
//! Status resolution prefers the live value from the run's control socket
//! and falls back to the status-log tail; an attempt whose writer died
//! without finalizing is reconciled to Aborted. Stop is cooperative and
//! idempotent, polled at 100 ms up to a deadline.

use crate::admission::{Admission, AdmitOptions, Decision};
use crate::error::{AdmissionError, ManagerError};
use crate::sock;
use chrono::Utc;
use dagrun_core::{Dag, DagRunRef, IdGen, Phase, RunId, Status, Trigger, UuidIdGen};
use dagrun_storage::{
    Attempt, CreateOptions, ProcError, ProcHandle, QueueItem, StatusLogWriter,
};
use std::time::Duration;
use tracing::{debug, info};

/// Interval between stop polls.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Overall stop deadline before `StopTimedOut`.
pub const STOP_DEADLINE: Duration = Duration::from_secs(30);

/// Timeout for one control-socket exchange.
const SOCKET_TIMEOUT: Duration = Duration::from_millis(500);

/// What a start request resolved to.
#[derive(Debug)]
pub enum StartOutcome {
    /// Admitted: the caller executes the attempt while holding the slot.
    Execute {
        attempt: Attempt,
        handle: ProcHandle,
        status: Status,
    },
    /// Deferred to the DAG's queue.
    Enqueued(DagRunRef),
}

/// Facade over admission and the three stores.
#[derive(Clone)]
pub struct RunManager {
    admission: Admission,
}

impl RunManager {
    pub fn new(admission: Admission) -> Self {
        Self { admission }
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// Admit and prepare a fresh run.
    ///
    /// On execute-now the attempt is created and the initial status built;
    /// the caller drives the agent. On enqueue the Queued attempt was
    /// already recorded by admission.
    pub fn start_run(
        &self,
        dag: &Dag,
        run_id: Option<RunId>,
        params: &str,
        trigger: Trigger,
        opts: AdmitOptions,
    ) -> Result<StartOutcome, ManagerError> {
        let run_id = run_id.unwrap_or_else(|| RunId::new(UuidIdGen.next()));
        let decision = self
            .admission
            .admit(dag, &run_id, Utc::now(), params, opts)?;

        match decision {
            Decision::Enqueued(dag_run) => Ok(StartOutcome::Enqueued(dag_run)),
            Decision::Execute(handle) => {
                let attempt = match self.admission.runs().create_attempt(
                    dag,
                    Utc::now(),
                    &run_id,
                    CreateOptions::default(),
                ) {
                    Ok(attempt) => attempt,
                    Err(dagrun_storage::StoreError::ConflictingAttempt(r)) => {
                        // Lost the record-creation race: release the slot
                        let _ = handle.stop();
                        return Err(AdmissionError::AlreadyExists(r).into());
                    }
                    Err(e) => {
                        let _ = handle.stop();
                        return Err(AdmissionError::from(e).into());
                    }
                };
                let mut status = Status::initial(dag, run_id, Phase::NotStarted);
                status.params = params.to_string();
                status.trigger = trigger;
                Ok(StartOutcome::Execute {
                    attempt,
                    handle,
                    status,
                })
            }
        }
    }

    /// Current status: live socket value first, tail fallback, interrupted
    /// attempts reconciled to Aborted.
    pub async fn current_status(&self, dag_run: &DagRunRef) -> Result<Status, ManagerError> {
        let attempt = self
            .admission
            .runs()
            .find_attempt(dag_run)
            .map_err(|_| ManagerError::NotFound(dag_run.clone()))?;
        self.resolve_status(&attempt).await
    }

    /// Latest persisted status of a DAG, any run.
    pub async fn latest_status(&self, dag_name: &str) -> Result<Status, ManagerError> {
        let attempt = self
            .admission
            .runs()
            .latest_attempt(dag_name)
            .map_err(ManagerError::Store)?;
        self.resolve_status(&attempt).await
    }

    async fn resolve_status(&self, attempt: &Attempt) -> Result<Status, ManagerError> {
        let dag = attempt.dag()?;
        let sock_path = self
            .admission
            .procs()
            .socket_path(dag.proc_group(), attempt.run_id().as_str());

        if let Ok(Ok(live)) =
            tokio::time::timeout(SOCKET_TIMEOUT, sock::query_status(&sock_path)).await
        {
            return Ok(live);
        }

        let mut status = attempt
            .latest_status()?
            .unwrap_or_else(|| Status::initial(&dag, attempt.run_id().clone(), Phase::NotStarted));

        // Writer died mid-run: the sentinel survives without a closed marker
        if attempt.is_interrupted() && status.phase.is_active() {
            status.phase = Phase::Aborted;
            status.error = Some("attempt interrupted before finalize".to_string());
        }
        Ok(status)
    }

    /// Request a cooperative stop. Stopping a non-running run is a no-op.
    pub async fn stop(&self, dag_run: &DagRunRef) -> Result<(), ManagerError> {
        let attempt = self
            .admission
            .runs()
            .find_attempt(dag_run)
            .map_err(|_| ManagerError::NotFound(dag_run.clone()))?;
        let dag = attempt.dag()?;
        let sock_path = self
            .admission
            .procs()
            .socket_path(dag.proc_group(), dag_run.run_id.as_str());

        match tokio::time::timeout(SOCKET_TIMEOUT, sock::send_stop(&sock_path)).await {
            Ok(Ok(())) => debug!(dag_run = %dag_run, "stop requested"),
            _ => debug!(dag_run = %dag_run, "no live agent to stop"),
        }
        Ok(())
    }

    /// Stop and poll at 100 ms until the run is observed non-Running.
    pub async fn stop_and_wait(
        &self,
        dag_run: &DagRunRef,
        deadline: Duration,
    ) -> Result<(), ManagerError> {
        let started = tokio::time::Instant::now();
        loop {
            let status = self.current_status(dag_run).await?;
            if status.phase != Phase::Running {
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(ManagerError::StopTimedOut(deadline, dag_run.clone()));
            }
            // Resend: the agent may have missed the first request
            self.stop(dag_run).await?;
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    }

    /// Restart: stop the current run, wait out `restart_wait`, then re-enter
    /// admission under a fresh run id with the preserved params snapshot.
    pub async fn restart(
        &self,
        dag: &Dag,
        dag_run: &DagRunRef,
    ) -> Result<StartOutcome, ManagerError> {
        let previous = self.current_status(dag_run).await?;
        if previous.phase == Phase::Running {
            self.stop_and_wait(dag_run, STOP_DEADLINE).await?;
        }

        if dag.restart_wait_secs > 0 {
            tokio::time::sleep(Duration::from_secs(dag.restart_wait_secs)).await;
        }

        let params = previous.params_snapshot();
        info!(dag = %dag.name, from = %dag_run.run_id, "restarting with preserved params");
        self.start_run(dag, None, &params, Trigger::Manual, AdmitOptions::default())
    }

    /// Retry: a new attempt under the same run id.
    ///
    /// The new attempt's nodes are seeded from the previous attempt so a
    /// `--step` retry re-executes only that step.
    pub fn retry(
        &self,
        dag_run: &DagRunRef,
        step: Option<&str>,
    ) -> Result<StartOutcome, ManagerError> {
        let previous = self
            .admission
            .runs()
            .find_attempt(dag_run)
            .map_err(|_| ManagerError::NotFound(dag_run.clone()))?;
        let dag = previous.dag()?;
        let prev_status = previous.latest_status()?;

        let handle = self.acquire_slot(&dag, dag_run)?;
        let attempt = match self.admission.runs().create_attempt(
            &dag,
            Utc::now(),
            &dag_run.run_id,
            CreateOptions { retry: true },
        ) {
            Ok(attempt) => attempt,
            Err(e) => {
                let _ = handle.stop();
                return Err(ManagerError::Store(e));
            }
        };

        let mut status = seed_retry_status(&dag, dag_run.run_id.clone(), prev_status, step);
        status.trigger = Trigger::Retry;
        Ok(StartOutcome::Execute {
            attempt,
            handle,
            status,
        })
    }

    /// Pop the queue head and re-run admission for it.
    ///
    /// Returns `None` when the queue is empty or the group is still at
    /// capacity (the item goes back to the queue in that case).
    pub fn dequeue_next(&self, queue: &str) -> Result<Option<StartOutcome>, ManagerError> {
        let Some(item) = self.admission.queues().dequeue(queue)? else {
            return Ok(None);
        };

        match self.acquire_slot(&item.dag, &item.dag_run) {
            Ok(handle) => {
                let attempt = self.admission.runs().create_attempt(
                    &item.dag,
                    Utc::now(),
                    &item.dag_run.run_id,
                    CreateOptions { retry: true },
                )?;
                let mut status =
                    Status::initial(&item.dag, item.dag_run.run_id.clone(), Phase::NotStarted);
                status.params = item.params.clone();
                status.trigger = Trigger::Queue;
                Ok(Some(StartOutcome::Execute {
                    attempt,
                    handle,
                    status,
                }))
            }
            Err(AdmissionError::MaxRunsReached { .. }) => {
                // Still at capacity: put it back (tail) for the next poll
                self.admission.queues().enqueue(queue, &item)?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Dequeue the head of a queue and abort it (the un-targeted form of
    /// the CLI verb). `None` when the queue is empty.
    pub fn dequeue_abort_head(&self, queue: &str) -> Result<Option<QueueItem>, ManagerError> {
        let Some(item) = self.admission.queues().dequeue(queue)? else {
            return Ok(None);
        };
        self.abort_queued_run(&item.dag_run)?;
        Ok(Some(item))
    }

    /// Targeted dequeue for the CLI verb: the queued run is recorded as
    /// Aborted, then hidden, unless no other attempt exists for the run,
    /// in which case the whole run is removed.
    pub fn dequeue_abort(
        &self,
        queue: &str,
        dag_run: &DagRunRef,
    ) -> Result<QueueItem, ManagerError> {
        let item = self
            .admission
            .queues()
            .dequeue_run(queue, dag_run)?
            .ok_or_else(|| ManagerError::NotQueued(dag_run.clone()))?;
        self.abort_queued_run(dag_run)?;
        Ok(item)
    }

    fn abort_queued_run(&self, dag_run: &DagRunRef) -> Result<(), ManagerError> {
        let attempts = self.admission.runs().attempts_for_run(dag_run)?;
        if let Some(queued) = attempts
            .iter()
            .find(|a| matches!(a.latest_status(), Ok(Some(s)) if s.phase == Phase::Queued))
        {
            // Append the terminal Aborted record directly; the attempt was
            // finalized at enqueue time and owns no live writer
            if let Ok(Some(mut status)) = queued.latest_status() {
                status.phase = Phase::Aborted;
                status.finished_at = Some(Utc::now());
                let mut log =
                    StatusLogWriter::open(&queued.dir().join(dagrun_storage::attempt::STATUS_FILE))?;
                log.append(&status)?;
                log.sync()?;
            }

            if attempts.len() > 1 {
                queued.clone().hide()?;
            } else {
                self.admission.runs().remove_run(dag_run)?;
            }
        }
        Ok(())
    }

    /// Lock → recount → acquire for a run that bypasses the conflict check
    /// (retry and dequeue paths).
    fn acquire_slot(&self, dag: &Dag, dag_run: &DagRunRef) -> Result<ProcHandle, AdmissionError> {
        let group = dag.proc_group();
        let max_active = dag.max_active_runs;
        match self.admission.procs().try_lock(group) {
            Ok(_lock) => {
                let live = self
                    .admission
                    .procs()
                    .count_alive_by_dag_name(group, &dag.name)?;
                if max_active > 0 && live >= max_active as usize {
                    return Err(AdmissionError::MaxRunsReached {
                        proc_group: group.to_string(),
                        max_active_runs: max_active,
                    });
                }
                Ok(self.admission.procs().acquire(group, dag_run)?)
            }
            Err(ProcError::Contended(_)) => Err(AdmissionError::MaxRunsReached {
                proc_group: group.to_string(),
                max_active_runs: max_active,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Seed the retry status from the previous attempt's nodes.
fn seed_retry_status(
    dag: &Dag,
    run_id: RunId,
    previous: Option<Status>,
    step: Option<&str>,
) -> Status {
    let mut status = Status::initial(dag, run_id, Phase::NotStarted);
    let Some(previous) = previous else {
        return status;
    };

    status.params = previous.params.clone();
    status.params_list = previous.params_list.clone();

    match step {
        Some(step) => {
            // Keep every settled node; reset only the retried step
            for node in &mut status.nodes {
                if node.step == step {
                    continue;
                }
                if let Some(prev) = previous.node(&node.step) {
                    *node = prev.clone();
                }
            }
        }
        None => {
            // Full retry: fresh nodes, but carry the per-node retry counters
            for node in &mut status.nodes {
                if let Some(prev) = previous.node(&node.step) {
                    node.retry_count = prev.retry_count + 1;
                    node.done_count = prev.done_count;
                }
            }
        }
    }
    status
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The admission controller: execute-now, enqueue, or reject.
//!
//! The live count is advisory outside the proc-group lock and strictly
//! honored under it. When two admitters race, whichever takes the lock
//! first wins; the loser re-reads the count and either admits (a slot may
//! have been released) or falls through to the queue.

use crate::error::AdmissionError;
use chrono::{DateTime, Utc};
use dagrun_core::{validate_run_id, Dag, DagRunRef, Phase, RunId, Status, Trigger};
use dagrun_storage::{
    queue::enqueue_stamp_ms, CreateOptions, ProcHandle, ProcStore, QueueItem, QueueStore, RunStore,
    StoreError,
};
use tracing::debug;

/// Environment switch that forces `queue_disabled` everywhere.
pub const DISABLE_QUEUE_ENV: &str = "DISABLE_DAG_RUN_QUEUE";

/// Flags affecting one admission decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitOptions {
    /// `--no-queue` or `DISABLE_DAG_RUN_QUEUE=1`: reject instead of enqueue.
    pub queue_disabled: bool,
    /// Treat the DAG as `max_active_runs = 1` regardless of its setting.
    pub singleton: bool,
}

impl AdmitOptions {
    /// Apply the environment override.
    pub fn from_env(mut self) -> Self {
        if std::env::var(DISABLE_QUEUE_ENV).map_or(false, |v| v == "1" || v == "true") {
            self.queue_disabled = true;
        }
        self
    }
}

/// The admission outcome for a run that was not rejected.
#[derive(Debug)]
pub enum Decision {
    /// Run now; the proc slot is held by the returned handle.
    Execute(ProcHandle),
    /// Deferred: a Queued attempt was recorded and the run sits in its queue.
    Enqueued(DagRunRef),
}

/// Admission controller over the three stores.
#[derive(Clone)]
pub struct Admission {
    runs: RunStore,
    procs: ProcStore,
    queues: QueueStore,
}

impl Admission {
    pub fn new(runs: RunStore, procs: ProcStore, queues: QueueStore) -> Self {
        Self {
            runs,
            procs,
            queues,
        }
    }

    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    pub fn procs(&self) -> &ProcStore {
        &self.procs
    }

    pub fn queues(&self) -> &QueueStore {
        &self.queues
    }

    /// Decide for `(dag, run_id)`: execute-now, enqueue, or reject.
    pub fn admit(
        &self,
        dag: &Dag,
        run_id: &RunId,
        created_at: DateTime<Utc>,
        params: &str,
        opts: AdmitOptions,
    ) -> Result<Decision, AdmissionError> {
        // 1. Run-id grammar
        validate_run_id(run_id.as_str())?;
        let dag_run = DagRunRef::new(dag.name.clone(), run_id.clone());

        // 2. Conflict check
        if self.runs.find_attempt(&dag_run).is_ok() {
            return Err(AdmissionError::AlreadyExists(dag_run));
        }

        let group = dag.proc_group();
        let singleton = opts.singleton || dag.max_active_runs == 1;
        let max_active = if opts.singleton && dag.max_active_runs == 0 {
            1
        } else {
            dag.max_active_runs
        };

        // 3. Advisory count outside the lock
        let live = self.procs.count_alive_by_dag_name(group, &dag.name)?;

        // 4. Singleton fast-fail (reject, or defer when queueing is allowed)
        if singleton && live > 0 {
            if opts.queue_disabled {
                return Err(AdmissionError::AlreadyRunning(dag_run));
            }
            return self
                .enqueue(dag, dag_run, created_at, params)
                .map(Decision::Enqueued);
        }

        // 5–7. Take the group lock and recount strictly
        match self.procs.try_lock(group) {
            Ok(_lock) => {
                let live = self.procs.count_alive_by_dag_name(group, &dag.name)?;
                if max_active > 0 && live >= max_active as usize {
                    drop(_lock);
                    self.over_capacity(dag, dag_run, created_at, params, live, max_active, opts)
                } else {
                    let handle = self.procs.acquire(group, &dag_run)?;
                    debug!(dag = %dag.name, run_id = %run_id, live, "admitted for execution");
                    Ok(Decision::Execute(handle))
                }
            }
            // 5. Lock contention reads as at-capacity
            Err(dagrun_storage::ProcError::Contended(_)) => {
                self.over_capacity(dag, dag_run, created_at, params, live, max_active, opts)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unconditional enqueue for the `enqueue` CLI verb: the run skips the
    /// capacity check entirely and waits for the scheduler's dequeue.
    pub fn enqueue_run(
        &self,
        dag: &Dag,
        run_id: &RunId,
        created_at: DateTime<Utc>,
        params: &str,
    ) -> Result<DagRunRef, AdmissionError> {
        validate_run_id(run_id.as_str())?;
        let dag_run = DagRunRef::new(dag.name.clone(), run_id.clone());
        if self.runs.find_attempt(&dag_run).is_ok() {
            return Err(AdmissionError::AlreadyExists(dag_run));
        }
        self.enqueue(dag, dag_run, created_at, params)
    }

    /// 8. The `MaxRunsReached` path: reject, check the queue cap, or enqueue.
    #[allow(clippy::too_many_arguments)]
    fn over_capacity(
        &self,
        dag: &Dag,
        dag_run: DagRunRef,
        created_at: DateTime<Utc>,
        params: &str,
        live: usize,
        max_active: u32,
        opts: AdmitOptions,
    ) -> Result<Decision, AdmissionError> {
        if opts.queue_disabled {
            if max_active == 1 {
                return Err(AdmissionError::AlreadyRunning(dag_run));
            }
            return Err(AdmissionError::MaxRunsReached {
                proc_group: dag.proc_group().to_string(),
                max_active_runs: max_active,
            });
        }

        // Named queue with a bounded pool: cap waiting + live at the pool size
        if !dag.queue.is_empty() && max_active > 1 {
            let waiting = self
                .queues
                .list_by_dag_name(dag.queue_name(), &dag.name)?
                .len();
            if waiting + live >= max_active as usize {
                return Err(AdmissionError::QueueFull {
                    queue: dag.queue_name().to_string(),
                    dag_name: dag.name.clone(),
                });
            }
        }

        self.enqueue(dag, dag_run, created_at, params)
            .map(Decision::Enqueued)
    }

    /// Record a Queued attempt and push the run onto its queue.
    fn enqueue(
        &self,
        dag: &Dag,
        dag_run: DagRunRef,
        created_at: DateTime<Utc>,
        params: &str,
    ) -> Result<DagRunRef, AdmissionError> {
        let attempt = match self.runs.create_attempt(
            dag,
            created_at,
            &dag_run.run_id,
            CreateOptions::default(),
        ) {
            Ok(attempt) => attempt,
            Err(StoreError::ConflictingAttempt(r)) => {
                return Err(AdmissionError::AlreadyExists(r))
            }
            Err(e) => return Err(e.into()),
        };

        let mut status = Status::initial(dag, dag_run.run_id.clone(), Phase::Queued);
        status.params = params.to_string();
        status.trigger = Trigger::Manual;
        let mut writer = attempt.open()?;
        writer.write(&status)?;
        writer.close()?;

        self.queues.enqueue(
            dag.queue_name(),
            &QueueItem {
                queue_name: dag.queue_name().to_string(),
                dag_run: dag_run.clone(),
                enqueued_at_ms: enqueue_stamp_ms(),
                dag: dag.clone(),
                params: params.to_string(),
            },
        )?;

        debug!(dag = %dag.name, run_id = %dag_run.run_id, queue = dag.queue_name(), "enqueued");
        Ok(dag_run)
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;

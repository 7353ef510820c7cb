// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The matching engine between dispatched tasks and waiting pollers.
//!
//! Pollers wait FIFO by arrival; a task goes to the longest-waiting poller
//! whose labels satisfy it. Dispatched tasks unacked within the ack window
//! requeue at the front (their place in line is preserved). Tasks unmatched
//! past their TTL finish with an error.

use crate::proto::{StatusUpdate, Task, TaskPhase, TaskState};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Default window for a poller to ack a dispatched task.
pub const DEFAULT_ACK_WINDOW: Duration = Duration::from_secs(30);

struct WaitingPoller {
    worker_id: String,
    poller_id: String,
    labels: BTreeMap<String, String>,
    tx: oneshot::Sender<Task>,
}

struct QueuedTask {
    task: Task,
    expires_at: Instant,
}

struct TaskEntry {
    state: TaskState,
    /// Ack deadline while dispatched.
    ack_deadline: Option<Instant>,
}

#[derive(Default)]
struct BrokerState {
    /// FIFO by poll arrival.
    waiting: VecDeque<WaitingPoller>,
    /// Tasks with no matching poller yet, dispatch order.
    queued: VecDeque<QueuedTask>,
    /// Every known task by id.
    tasks: HashMap<String, TaskEntry>,
}

/// In-memory broker shared by the server's connections.
#[derive(Clone)]
pub struct Broker {
    state: Arc<Mutex<BrokerState>>,
    ack_window: Duration,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_WINDOW)
    }
}

impl Broker {
    pub fn new(ack_window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            ack_window,
        }
    }

    /// Long-poll for a task. Returns `None` on timeout.
    pub async fn poll(
        &self,
        worker_id: &str,
        poller_id: &str,
        labels: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Option<Task> {
        let rx = {
            let mut state = self.state.lock();

            // A queued task may already be waiting for someone like us
            if let Some(pos) = state
                .queued
                .iter()
                .position(|q| q.task.matches(&labels))
            {
                let queued = state.queued.remove(pos)?;
                mark_dispatched(
                    &mut state,
                    &queued.task.task_id,
                    worker_id,
                    Instant::now() + self.ack_window,
                );
                debug!(task_id = %queued.task.task_id, worker_id, "matched queued task");
                return Some(queued.task);
            }

            let (tx, rx) = oneshot::channel();
            state.waiting.push_back(WaitingPoller {
                worker_id: worker_id.to_string(),
                poller_id: poller_id.to_string(),
                labels,
                tx,
            });
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            // Already marked dispatched by the sender, under the lock
            Ok(Ok(task)) => Some(task),
            _ => {
                // Timed out or sender dropped: withdraw from the wait queue
                let mut state = self.state.lock();
                state.waiting.retain(|p| p.poller_id != poller_id);
                None
            }
        }
    }

    /// Submit a task. Hands it to the longest-waiting matching poller, or
    /// queues it until one arrives.
    pub fn dispatch(&self, task: Task) {
        let mut state = self.state.lock();
        let task_id = task.task_id.clone();
        state.tasks.insert(
            task_id.clone(),
            TaskEntry {
                state: TaskState {
                    task: task.clone(),
                    phase: TaskPhase::Queued,
                    worker_id: None,
                    last_status: None,
                    error: None,
                },
                ack_deadline: None,
            },
        );

        let mut task = task;
        // Longest-waiting first: scan from the front
        while let Some(pos) = state.waiting.iter().position(|p| task.matches(&p.labels)) {
            let Some(poller) = state.waiting.remove(pos) else {
                break;
            };
            match poller.tx.send(task) {
                Ok(()) => {
                    debug!(task_id = %task_id, poller_id = %poller.poller_id, "dispatched to waiting poller");
                    // Marked here, under the lock, so an abandoned receiver
                    // still requeues via the ack-window sweep
                    mark_dispatched(
                        &mut state,
                        &task_id,
                        &poller.worker_id,
                        Instant::now() + self.ack_window,
                    );
                    return;
                }
                // Poller gave up between queueing and send: try the next one
                Err(returned) => task = returned,
            }
        }

        let ttl = Duration::from_secs(task.ttl_secs.max(1));
        debug!(task_id = %task_id, "no matching poller, queueing task");
        state.queued.push_back(QueuedTask {
            task,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Worker acked a dispatched task.
    pub fn ack(&self, task_id: &str, worker_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if entry.state.phase != TaskPhase::Dispatched {
            // Idempotent: re-acks after claim are fine
            return entry.state.phase == TaskPhase::Claimed;
        }
        entry.state.phase = TaskPhase::Claimed;
        entry.state.worker_id = Some(worker_id.to_string());
        entry.ack_deadline = None;
        info!(task_id, worker_id, "task claimed");
        true
    }

    /// Record a streamed status update. Terminal phases finish the task.
    pub fn report(&self, update: StatusUpdate) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.tasks.get_mut(&update.task_id) else {
            return false;
        };
        if update.status.phase.is_terminal() {
            entry.state.phase = TaskPhase::Finished;
        }
        entry.state.last_status = Some(update.status);
        true
    }

    /// Task progress for `GetTask`.
    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.state.lock().tasks.get(task_id).map(|e| e.state.clone())
    }

    /// Periodic sweep: requeue unacked dispatches, expire unmatched tasks.
    pub fn tick(&self, now: Instant) {
        let mut state = self.state.lock();

        // Unacked dispatches go back to the FRONT so their place is kept
        let mut requeue = Vec::new();
        for (task_id, entry) in &mut state.tasks {
            if entry.state.phase == TaskPhase::Dispatched {
                if let Some(deadline) = entry.ack_deadline {
                    if now >= deadline {
                        warn!(task_id = %task_id, "ack window elapsed, requeueing task");
                        entry.state.phase = TaskPhase::Queued;
                        entry.state.worker_id = None;
                        entry.ack_deadline = None;
                        requeue.push(entry.state.task.clone());
                    }
                }
            }
        }
        for task in requeue {
            let ttl = Duration::from_secs(task.ttl_secs.max(1));
            state.queued.push_front(QueuedTask {
                task,
                expires_at: now + ttl,
            });
        }

        // Expire queued tasks past their TTL
        let mut expired = Vec::new();
        state.queued.retain(|q| {
            if now >= q.expires_at {
                expired.push(q.task.task_id.clone());
                false
            } else {
                true
            }
        });
        for task_id in expired {
            warn!(task_id = %task_id, "no worker matched within the task TTL");
            if let Some(entry) = state.tasks.get_mut(&task_id) {
                entry.state.phase = TaskPhase::Finished;
                entry.state.error = Some("no worker matched labels within the task TTL".into());
            }
        }
    }

    /// Number of pollers currently waiting.
    pub fn waiting_pollers(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Number of tasks waiting for a matching poller.
    pub fn queued_tasks(&self) -> usize {
        self.state.lock().queued.len()
    }
}

fn mark_dispatched(state: &mut BrokerState, task_id: &str, worker_id: &str, deadline: Instant) {
    if let Some(entry) = state.tasks.get_mut(task_id) {
        entry.state.phase = TaskPhase::Dispatched;
        entry.state.worker_id = Some(worker_id.to_string());
        entry.ack_deadline = Some(deadline);
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;

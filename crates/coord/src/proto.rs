// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator protocol messages.

use dagrun_core::{Dag, DagRunRef, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default time a task may wait for a matching poller.
pub const DEFAULT_TASK_TTL_SECS: u64 = 300;

/// A unit of remote work: one DAG run for one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub dag_run: DagRunRef,
    /// DAG snapshot; authoritative for shared-nothing workers.
    pub dag: Dag,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub params: String,
    /// A poller matches iff it advertises an equal value for every key.
    /// Empty = any worker.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub required_labels: BTreeMap<String, String>,
    /// Seconds the task may wait unmatched before failing.
    #[serde(default)]
    pub ttl_secs: u64,
}

impl Task {
    pub fn new(dag_run: DagRunRef, dag: Dag, params: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::now_v7().to_string(),
            dag_run,
            dag,
            params: params.into(),
            required_labels: BTreeMap::new(),
            ttl_secs: DEFAULT_TASK_TTL_SECS,
        }
    }

    /// Does a poller advertising `labels` satisfy this task's requirements?
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.required_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// One status report on the streaming back-channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: String,
    pub status: Status,
}

/// Broker-side view of a task's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Waiting for a matching poller.
    Queued,
    /// Handed to a poller, ack pending.
    Dispatched,
    /// Acked by the worker.
    Claimed,
    /// A terminal status was reported (or the TTL expired unmatched).
    Finished,
}

/// Task progress as returned by `GetTask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task: Task,
    pub phase: TaskPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Requests to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Long poll for work.
    Poll {
        worker_id: String,
        poller_id: String,
        #[serde(default)]
        labels: BTreeMap<String, String>,
        timeout_secs: u64,
    },
    /// Submit a task for remote execution.
    Dispatch { task: Task },
    /// Acknowledge receipt of a dispatched task.
    Ack { task_id: String, worker_id: String },
    /// Stream a status update for a claimed task.
    Report { update: StatusUpdate },
    /// Fetch a task's progress.
    GetTask { task_id: String },
    /// Liveness probe.
    Heartbeat,
}

/// Responses from the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// Poll matched: here is your task.
    Task { task: Task },
    /// Poll timed out with no work.
    Empty,
    /// Dispatch accepted.
    Dispatched { task_id: String },
    Ok,
    TaskState { state: TaskState },
    Error { message: String },
}

#[cfg(test)]
#[path = "proto_tests.rs"]
mod tests;

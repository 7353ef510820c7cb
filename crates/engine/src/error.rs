// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine layer

use dagrun_core::{DagRunRef, RunIdError};
use dagrun_storage::{AttemptError, ProcError, QueueError, StoreError};
use thiserror::Error;

/// Admission refusals and failures.
///
/// The refusal variants map to the CLI's admission exit code; the wrapped
/// store errors are ordinary failures.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid run ID: {0}")]
    InvalidRunId(#[from] RunIdError),
    #[error("dag-run already exists: {0}")]
    AlreadyExists(DagRunRef),
    #[error("dag-run is already running: {0}")]
    AlreadyRunning(DagRunRef),
    #[error("max active runs reached for {proc_group} ({max_active_runs})")]
    MaxRunsReached {
        proc_group: String,
        max_active_runs: u32,
    },
    #[error("queue {queue} is full for {dag_name}")]
    QueueFull { queue: String, dag_name: String },
    #[error("run rejected: {0}")]
    Rejected(String),
    #[error("run store error: {0}")]
    Store(#[from] StoreError),
    #[error("attempt error: {0}")]
    Attempt(#[from] AttemptError),
    #[error("proc store error: {0}")]
    Proc(#[from] ProcError),
    #[error("queue store error: {0}")]
    Queue(#[from] QueueError),
}

impl AdmissionError {
    /// True for refusals (the CLI's exit code 2), false for failures.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            AdmissionError::AlreadyExists(_)
                | AdmissionError::AlreadyRunning(_)
                | AdmissionError::MaxRunsReached { .. }
                | AdmissionError::QueueFull { .. }
                | AdmissionError::Rejected(_)
        )
    }
}

/// Run-manager failures.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no attempt found for {0}")]
    NotFound(DagRunRef),
    #[error("no queued item for {0}")]
    NotQueued(DagRunRef),
    #[error("stop timed out after {0:?} for {1}")]
    StopTimedOut(std::time::Duration, DagRunRef),
    #[error("admission error: {0}")]
    Admission(#[from] AdmissionError),
    #[error("run store error: {0}")]
    Store(#[from] StoreError),
    #[error("attempt error: {0}")]
    Attempt(#[from] AttemptError),
    #[error("queue store error: {0}")]
    Queue(#[from] QueueError),
    #[error("status log error: {0}")]
    StatusLog(#[from] dagrun_storage::StatusLogError),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Agent execution failures.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("step {step} has an empty command")]
    EmptyCommand { step: String },
    #[error("unknown step: {0}")]
    UnknownStep(String),
    #[error("attempt error: {0}")]
    Attempt(#[from] AttemptError),
    #[error("proc store error: {0}")]
    Proc(#[from] ProcError),
    #[error("control socket error: {0}")]
    Control(String),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The status document: one JSON line per snapshot in `status.jsonl`.

use crate::dag::Dag;
use crate::id::RunId;
use crate::run::DagRunRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a run.
///
/// Phases are ordered; a persisted status never moves to a lower rank, and
/// terminal phases never change at all (retries open a new attempt instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    Queued,
    Waiting,
    Running,
    Succeeded,
    Failed,
    PartiallySucceeded,
    Aborted,
    Rejected,
}

impl Phase {
    /// True once the run can no longer mutate (only new attempts may follow).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Succeeded
                | Phase::Failed
                | Phase::PartiallySucceeded
                | Phase::Aborted
                | Phase::Rejected
        )
    }

    /// True while the run occupies a proc slot or queue position.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Queued | Phase::Waiting | Phase::Running)
    }

    /// Monotonicity rank. Terminal phases share the top rank: they are
    /// unordered among themselves but all above the live phases.
    pub fn rank(&self) -> u8 {
        match self {
            Phase::NotStarted => 0,
            Phase::Queued => 1,
            Phase::Waiting => 2,
            Phase::Running => 3,
            _ => 4,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::NotStarted => "not_started",
            Phase::Queued => "queued",
            Phase::Waiting => "waiting",
            Phase::Running => "running",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::PartiallySucceeded => "partially_succeeded",
            Phase::Aborted => "aborted",
            Phase::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Phase::NotStarted),
            "queued" => Ok(Phase::Queued),
            "waiting" => Ok(Phase::Waiting),
            "running" => Ok(Phase::Running),
            "succeeded" | "success" => Ok(Phase::Succeeded),
            "failed" | "error" => Ok(Phase::Failed),
            "partially_succeeded" | "partial" => Ok(Phase::PartiallySucceeded),
            "aborted" | "cancelled" | "canceled" => Ok(Phase::Aborted),
            "rejected" => Ok(Phase::Rejected),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// Phase of one node (step) within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodePhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
    Skipped,
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodePhase::Pending => "pending",
            NodePhase::Running => "running",
            NodePhase::Succeeded => "succeeded",
            NodePhase::Failed => "failed",
            NodePhase::Aborted => "aborted",
            NodePhase::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Per-step record inside a status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub step: String,
    pub phase: NodePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub done_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Node {
    pub fn pending(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            phase: NodePhase::Pending,
            started_at: None,
            finished_at: None,
            stdout_path: None,
            stderr_path: None,
            retry_count: 0,
            done_count: 0,
            error: None,
        }
    }
}

/// How a run came to be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    #[default]
    Manual,
    Scheduler,
    Retry,
    Queue,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trigger::Manual => "manual",
            Trigger::Scheduler => "scheduler",
            Trigger::Retry => "retry",
            Trigger::Queue => "queue",
        };
        f.write_str(s)
    }
}

/// One status snapshot: the unit appended to `status.jsonl`.
///
/// The last parseable line of the file is the current status. Field order in
/// the JSON is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub run_id: RunId,
    pub name: String,
    #[serde(rename = "status")]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Raw parameter string as given on dispatch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub params: String,
    /// Split parameter list; fallback when `params` is empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_cancel: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<DagRunRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<DagRunRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Status {
    /// Initial status for a fresh attempt of `dag`, one pending node per step.
    pub fn initial(dag: &Dag, run_id: RunId, phase: Phase) -> Self {
        Self {
            run_id,
            name: dag.name.clone(),
            phase,
            started_at: None,
            finished_at: None,
            pid: None,
            params: dag.params.clone(),
            params_list: Vec::new(),
            nodes: dag.steps.keys().map(Node::pending).collect(),
            on_success: dag.handlers.on_success.as_ref().map(|s| Node::pending(&s.name)),
            on_failure: dag.handlers.on_failure.as_ref().map(|s| Node::pending(&s.name)),
            on_cancel: dag.handlers.on_cancel.as_ref().map(|s| Node::pending(&s.name)),
            on_exit: dag.handlers.on_exit.as_ref().map(|s| Node::pending(&s.name)),
            preconditions: dag.preconditions.clone(),
            log_path: None,
            worker_id: None,
            trigger: Trigger::Manual,
            tags: dag.tags.clone(),
            root: None,
            parent: None,
            error: None,
        }
    }

    /// Reference to the run this status belongs to.
    pub fn dag_run(&self) -> DagRunRef {
        DagRunRef::new(self.name.clone(), self.run_id.clone())
    }

    /// The effective parameter snapshot: `params` blob preferred,
    /// joined `params_list` as fallback.
    pub fn params_snapshot(&self) -> String {
        if !self.params.is_empty() {
            self.params.clone()
        } else {
            self.params_list.join(" ")
        }
    }

    pub fn node(&self, step: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.step == step)
    }

    pub fn node_mut(&mut self, step: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.step == step)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

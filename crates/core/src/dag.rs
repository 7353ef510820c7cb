// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The DAG snapshot consumed by the run lifecycle core.
//!
//! The YAML definition language and its parser are external collaborators;
//! the core deals only in this deserialized form, persisted as `dag.json`
//! inside each attempt directory.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One step of a DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    /// Command line to execute (argv; first element is the program).
    pub command: Vec<String>,
    /// Names of steps that must complete before this one starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    /// Working directory override for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    /// Extra environment for this step (KEY=VALUE resolved by the caller).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Shell to wrap the command in (empty = direct exec).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Keep executing later steps even if this one fails.
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl Step {
    /// A step that runs a single command with no dependencies.
    pub fn command(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: argv,
            depends: Vec::new(),
            workdir: None,
            env: Vec::new(),
            shell: None,
            continue_on_failure: false,
        }
    }
}

/// Lifecycle handler steps, run after the main graph settles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_cancel: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<Step>,
}

impl HandlerSet {
    pub fn is_empty(&self) -> bool {
        self.on_success.is_none()
            && self.on_failure.is_none()
            && self.on_cancel.is_none()
            && self.on_exit.is_none()
    }
}

/// A DAG definition as the core sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    /// Unique within a namespace.
    pub name: String,
    /// Concurrency key shared by all runs of this DAG. Empty = `name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proc_group: String,
    /// 0 = unbounded, 1 = singleton, >1 = bounded pool.
    #[serde(default)]
    pub max_active_runs: u32,
    /// Named queue for deferred runs. Empty = per-DAG default queue.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub queue: String,
    /// Seconds to wait between stop and restart.
    #[serde(default)]
    pub restart_wait_secs: u64,
    /// Log placement override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    /// Default parameter string applied when a run supplies none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub params: String,
    /// Steps in definition order. Keyed by step name.
    pub steps: IndexMap<String, Step>,
    #[serde(default, skip_serializing_if = "HandlerSet::is_empty")]
    pub handlers: HandlerSet,
    /// Precondition expressions, evaluated by the executor collaborator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Dag {
    /// Minimal DAG with the given steps, for callers assembling one in code.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            proc_group: String::new(),
            max_active_runs: 0,
            queue: String::new(),
            restart_wait_secs: 0,
            log_dir: None,
            params: String::new(),
            steps: steps.into_iter().map(|s| (s.name.clone(), s)).collect(),
            handlers: HandlerSet::default(),
            preconditions: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// The concurrency key for admission: `proc_group` or the DAG name.
    pub fn proc_group(&self) -> &str {
        if self.proc_group.is_empty() {
            &self.name
        } else {
            &self.proc_group
        }
    }

    /// The queue deferred runs land on: `queue` or the DAG name.
    pub fn queue_name(&self) -> &str {
        if self.queue.is_empty() {
            &self.name
        } else {
            &self.queue
        }
    }
}

#[cfg(test)]
#[path = "dag_tests.rs"]
mod tests;

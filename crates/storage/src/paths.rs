// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-root layout resolution.
//!
//! Everything dagrun persists lives under one root, partitioned by
//! namespace:
//!
//! ```text
//! <root>/dags/<ns>/                 DAG definitions (external collaborator)
//! <root>/data/ns/<ns>/dag-runs/     run-record store
//! <root>/data/ns/<ns>/proc/         process registry
//! <root>/data/ns/<ns>/queue/        queue store
//! <root>/data/ns/<ns>/suspend/      suspend flags
//! <root>/data/ns/<ns>/gitsync/      gitsync state
//! <root>/data/services/             service registry (not namespaced)
//! <root>/logs/ns/<ns>/              run logs
//! ```

use dagrun_core::Namespace;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "DAGRUN_HOME";

/// Resolved store locations for one namespace.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
    ns: Namespace,
}

impl DataDirs {
    /// Resolve the root from `$DAGRUN_HOME`, else `~/.local/share/dagrun`.
    pub fn resolve(ns: Namespace) -> Self {
        let root = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share/dagrun")))
            .unwrap_or_else(|| PathBuf::from(".dagrun"));
        Self::new(root, ns)
    }

    pub fn new(root: impl Into<PathBuf>, ns: Namespace) -> Self {
        Self {
            root: root.into(),
            ns,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn dags_dir(&self) -> PathBuf {
        self.root.join("dags").join(self.ns.as_str())
    }

    fn ns_data(&self) -> PathBuf {
        self.root.join("data").join("ns").join(self.ns.as_str())
    }

    pub fn dag_runs_dir(&self) -> PathBuf {
        self.ns_data().join("dag-runs")
    }

    pub fn proc_dir(&self) -> PathBuf {
        self.ns_data().join("proc")
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.ns_data().join("queue")
    }

    pub fn suspend_dir(&self) -> PathBuf {
        self.ns_data().join("suspend")
    }

    pub fn services_dir(&self) -> PathBuf {
        self.root.join("data").join("services")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs").join("ns").join(self.ns.as_str())
    }

    /// Log directory for one run: `<logs>/<safe-name>/<run-id>/`.
    pub fn run_log_dir(&self, dag_name: &str, run_id: &str) -> PathBuf {
        self.logs_dir()
            .join(dagrun_core::safe_name(dag_name))
            .join(run_id)
    }

    /// Path of the optional `config.toml` at the data root.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;

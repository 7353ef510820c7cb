// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run-record store: per-(DAG, run-id, attempt) status history.
//!
//! Layout under the dag-runs root:
//!
//! ```text
//! <root>/<safe-dag-name>/<YYYYmmdd_HHMMSSZ>_<run-id>/   one attempt
//! <root>/<safe-dag-name>/.hidden/<…>/                   superseded attempts
//! ```
//!
//! A "run" is the set of attempt directories sharing a run id; retries add
//! attempts. Directory names embed the creation time so lexicographic sort
//! is chronological sort.

use crate::attempt::{Attempt, AttemptError, HIDDEN_DIR};
use chrono::{DateTime, Utc};
use dagrun_core::{
    run_dir_name, safe_name, validate_run_id, Dag, DagRunRef, Phase, RunId, RunIdError, Status,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Hard cap on `list_statuses` results.
pub const LIST_LIMIT_CAP: usize = 1000;

/// Default `list_statuses` limit.
pub const LIST_LIMIT_DEFAULT: usize = 100;

/// Errors from run-store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid run ID: {0}")]
    InvalidRunId(#[from] RunIdError),
    #[error("conflicting attempt already open for {0}")]
    ConflictingAttempt(DagRunRef),
    #[error("no attempt found for {0}")]
    NotFound(DagRunRef),
    #[error("no runs recorded for DAG {0}")]
    NoRuns(String),
    #[error("attempt error: {0}")]
    Attempt(#[from] AttemptError),
}

/// Filters for [`RunStore::list_statuses`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Exact DAG name.
    pub name: Option<String>,
    /// UTC half-open window `[from, to)` on attempt creation time.
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Keep only these phases (empty = all).
    pub phases: Vec<Phase>,
    /// Run-id prefix or substring match.
    pub run_id: Option<String>,
    /// All of these tags must be present.
    pub tags: Vec<String>,
    /// Result cap; 0 means the default. Values above the cap are clamped.
    pub limit: usize,
}

impl ListFilter {
    fn effective_limit(&self) -> usize {
        let limit = if self.limit == 0 {
            LIST_LIMIT_DEFAULT
        } else {
            self.limit
        };
        limit.min(LIST_LIMIT_CAP)
    }

    fn matches(&self, status: &Status, created_at: DateTime<Utc>) -> bool {
        if let Some(name) = &self.name {
            if status.name != *name {
                return false;
            }
        }
        if let Some(from) = self.from {
            if created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if created_at >= to {
                return false;
            }
        }
        if !self.phases.is_empty() && !self.phases.contains(&status.phase) {
            return false;
        }
        if let Some(needle) = &self.run_id {
            if !status.run_id.as_str().contains(needle.as_str()) {
                return false;
            }
        }
        self.tags.iter().all(|t| status.tags.contains(t))
    }
}

/// Options for [`RunStore::create_attempt`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Allow an attempt when prior attempts for the run exist (retry path).
    pub retry: bool,
}

/// Filesystem-backed run-record store.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dag_dir(&self, dag_name: &str) -> PathBuf {
        self.root.join(safe_name(dag_name))
    }

    /// Create a new attempt for `(dag.name, run_id)`.
    ///
    /// Fails with [`StoreError::ConflictingAttempt`] when the run already
    /// holds an open attempt, and (unless `opts.retry`) when any attempt
    /// for the run exists at all.
    pub fn create_attempt(
        &self,
        dag: &Dag,
        created_at: DateTime<Utc>,
        run_id: &RunId,
        opts: CreateOptions,
    ) -> Result<Attempt, StoreError> {
        validate_run_id(run_id.as_str())?;
        let dag_run = DagRunRef::new(dag.name.clone(), run_id.clone());

        let existing = self.attempts_for_run(&dag_run)?;
        if existing.iter().any(Attempt::is_open) {
            return Err(StoreError::ConflictingAttempt(dag_run));
        }
        if !existing.is_empty() && !opts.retry {
            return Err(StoreError::ConflictingAttempt(dag_run));
        }

        let dir = self
            .dag_dir(&dag.name)
            .join(run_dir_name(created_at, run_id));
        debug!(dag = %dag.name, run_id = %run_id, dir = %dir.display(), "creating attempt");
        Ok(Attempt::create(dir, dag, run_id.clone(), created_at)?)
    }

    /// Newest visible attempt for the given run.
    pub fn find_attempt(&self, dag_run: &DagRunRef) -> Result<Attempt, StoreError> {
        self.attempts_for_run(dag_run)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(dag_run.clone()))
    }

    /// All visible attempts for a run, newest first.
    pub fn attempts_for_run(&self, dag_run: &DagRunRef) -> Result<Vec<Attempt>, StoreError> {
        let mut attempts: Vec<Attempt> = self
            .visible_attempt_dirs(&dag_run.name)?
            .into_iter()
            .filter_map(|dir| Attempt::load(dir).ok())
            .filter(|a| a.run_id() == &dag_run.run_id)
            .collect();
        attempts.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(attempts)
    }

    /// Newest attempt across all runs of a DAG.
    pub fn latest_attempt(&self, dag_name: &str) -> Result<Attempt, StoreError> {
        self.recent_attempts(dag_name, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NoRuns(dag_name.to_string()))
    }

    /// Up to `n` newest attempts of a DAG, newest first.
    pub fn recent_attempts(&self, dag_name: &str, n: usize) -> Result<Vec<Attempt>, StoreError> {
        let mut dirs = self.visible_attempt_dirs(dag_name)?;
        // Directory names sort chronologically; newest last
        dirs.sort();
        Ok(dirs
            .into_iter()
            .rev()
            .take(n)
            .filter_map(|dir| Attempt::load(dir).ok())
            .collect())
    }

    /// Latest status per run, filtered, newest first.
    pub fn list_statuses(&self, filter: &ListFilter) -> Result<Vec<Status>, StoreError> {
        let dag_names: Vec<String> = match &filter.name {
            Some(name) => vec![name.clone()],
            None => self.dag_names()?,
        };

        let mut entries: Vec<(DateTime<Utc>, Status)> = Vec::new();
        for name in dag_names {
            let mut attempts: Vec<Attempt> = self
                .visible_attempt_dirs(&name)?
                .into_iter()
                .filter_map(|dir| Attempt::load(dir).ok())
                .collect();
            attempts.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

            // Newest attempt wins per run id
            let mut seen: std::collections::HashSet<RunId> = std::collections::HashSet::new();
            for attempt in attempts {
                if !seen.insert(attempt.run_id().clone()) {
                    continue;
                }
                let status = match attempt.latest_status() {
                    Ok(Some(status)) => status,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(dir = %attempt.dir().display(), error = %e, "unreadable status, skipping");
                        continue;
                    }
                };
                if filter.matches(&status, attempt.created_at()) {
                    entries.push((attempt.created_at(), status));
                }
            }
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.truncate(filter.effective_limit());
        Ok(entries.into_iter().map(|(_, s)| s).collect())
    }

    /// Attempts past the retention cutoff and not active, i.e. what
    /// [`RunStore::remove_old`] would delete. Used for `cleanup --dry-run`.
    pub fn list_expired(
        &self,
        dag_name: &str,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Attempt>, StoreError> {
        let cutoff = now - chrono::Duration::days(i64::from(retention_days));
        let mut expired = Vec::new();

        for attempt in self.recent_attempts(dag_name, usize::MAX)? {
            if newest_mtime(attempt.dir())? >= cutoff {
                continue;
            }
            if let Ok(Some(status)) = attempt.latest_status() {
                if status.phase.is_active() {
                    continue;
                }
            }
            expired.push(attempt);
        }
        Ok(expired)
    }

    /// Delete runs older than the retention cutoff.
    ///
    /// A run is removed when the newest file mtime across its attempts is
    /// older than `retention_days` and its latest status is not active
    /// (Running/Queued/Waiting). Returns the removed run ids.
    pub fn remove_old(
        &self,
        dag_name: &str,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<RunId>, StoreError> {
        let mut removed = Vec::new();
        for attempt in self.list_expired(dag_name, retention_days, now)? {
            debug!(dag = dag_name, run_id = %attempt.run_id(), "removing expired run");
            let run_id = attempt.run_id().clone();
            std::fs::remove_dir_all(attempt.dir())?;
            if !removed.contains(&run_id) {
                removed.push(run_id);
            }
        }
        Ok(removed)
    }

    /// Remove every trace of a run (all attempts, hidden included).
    pub fn remove_run(&self, dag_run: &DagRunRef) -> Result<(), StoreError> {
        for attempt in self.attempts_for_run(dag_run)? {
            std::fs::remove_dir_all(attempt.dir())?;
        }
        let hidden = self.dag_dir(&dag_run.name).join(HIDDEN_DIR);
        if hidden.is_dir() {
            for entry in std::fs::read_dir(&hidden)? {
                let path = entry?.path();
                if let Ok(attempt) = Attempt::load(path.clone()) {
                    if attempt.run_id() == &dag_run.run_id {
                        std::fs::remove_dir_all(&path)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Create an attempt for a sub-DAG under its root run's directory.
    ///
    /// Child run-id uniqueness is scoped to the root attempt: two different
    /// roots may both hold a child named `(dag, run_id)`.
    pub fn create_child_attempt(
        &self,
        root: &Attempt,
        dag: &Dag,
        created_at: DateTime<Utc>,
        run_id: &RunId,
    ) -> Result<Attempt, StoreError> {
        validate_run_id(run_id.as_str())?;
        let dag_run = DagRunRef::new(dag.name.clone(), run_id.clone());

        if !self.child_attempts(root, &dag_run)?.is_empty() {
            return Err(StoreError::ConflictingAttempt(dag_run));
        }

        let dir = root
            .children_dir()
            .join(safe_name(&dag.name))
            .join(run_dir_name(created_at, run_id));
        Ok(Attempt::create(dir, dag, run_id.clone(), created_at)?)
    }

    /// Newest child attempt for `(dag, run_id)` under a root attempt.
    pub fn find_child_attempt(
        &self,
        root: &Attempt,
        dag_run: &DagRunRef,
    ) -> Result<Attempt, StoreError> {
        self.child_attempts(root, dag_run)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(dag_run.clone()))
    }

    fn child_attempts(
        &self,
        root: &Attempt,
        dag_run: &DagRunRef,
    ) -> Result<Vec<Attempt>, StoreError> {
        let dir = root.children_dir().join(safe_name(&dag_run.name));
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut attempts: Vec<Attempt> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter_map(|path| Attempt::load(path).ok())
            .filter(|a| a.run_id() == &dag_run.run_id)
            .collect();
        attempts.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(attempts)
    }

    /// DAG names with at least one recorded run.
    pub fn dag_names(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn visible_attempt_dirs(&self, dag_name: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.dag_dir(dag_name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == HIDDEN_DIR || dagrun_core::parse_run_dir_name(name).is_none() {
                continue;
            }
            dirs.push(entry.path());
        }
        Ok(dirs)
    }
}

/// Newest mtime of any file under `dir`.
fn newest_mtime(dir: &Path) -> Result<DateTime<Utc>, StoreError> {
    let mut newest: Option<std::time::SystemTime> = None;
    let mut stack = vec![dir.to_owned()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                stack.push(entry.path());
            } else {
                let mtime = entry.metadata()?.modified()?;
                if newest.map_or(true, |n| mtime > n) {
                    newest = Some(mtime);
                }
            }
        }
    }
    Ok(newest.map(DateTime::<Utc>::from).unwrap_or(DateTime::UNIX_EPOCH))
}

#[cfg(test)]
#[path = "runstore_tests.rs"]
mod tests;

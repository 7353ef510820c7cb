// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One execution attempt: a run directory and its lifecycle.
//!
//! Create → Open (exclusive writer) → Write* (append) → Close (finalize) →
//! optionally Hide. Attempts are immutable after Close. The open-writer
//! sentinel (`attempt.lock`) is created with `O_CREAT|O_EXCL`; Close renames
//! it into the `attempt.closed` marker, so a lock with no marker after
//! process death is the signal of an interrupted attempt.

use crate::statuslog::{read_latest_status, StatusLogError, StatusLogWriter};
use chrono::{DateTime, Utc};
use dagrun_core::{parse_run_dir_name, Dag, DagRunRef, RunId, Status};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DAG_FILE: &str = "dag.json";
pub const STATUS_FILE: &str = "status.jsonl";
pub const LOCK_FILE: &str = "attempt.lock";
pub const CLOSED_FILE: &str = "attempt.closed";
pub const CHILDREN_DIR: &str = "children";
pub const HIDDEN_DIR: &str = ".hidden";

/// Errors from attempt operations
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("status log error: {0}")]
    StatusLog(#[from] StatusLogError),
    #[error("attempt already open: {0}")]
    AlreadyOpen(DagRunRef),
    #[error("attempt is closed: {0}")]
    Closed(DagRunRef),
    #[error("not a run directory: {0}")]
    NotARunDir(PathBuf),
}

/// A single attempt on disk.
#[derive(Debug, Clone)]
pub struct Attempt {
    dir: PathBuf,
    dag_name: String,
    run_id: RunId,
    created_at: DateTime<Utc>,
}

impl Attempt {
    /// Create the attempt directory and persist the DAG snapshot.
    ///
    /// The caller (the run store) has already checked for conflicts; this
    /// only lays down `dag.json` atomically.
    pub(crate) fn create(
        dir: PathBuf,
        dag: &Dag,
        run_id: RunId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        std::fs::create_dir_all(&dir)?;
        write_json_atomic(&dir.join(DAG_FILE), dag)?;
        Ok(Self {
            dir,
            dag_name: dag.name.clone(),
            run_id,
            created_at,
        })
    }

    /// Load an attempt from an existing run directory.
    pub fn load(dir: PathBuf) -> Result<Self, AttemptError> {
        let dir_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AttemptError::NotARunDir(dir.clone()))?;
        let (created_at, run_id) =
            parse_run_dir_name(dir_name).ok_or_else(|| AttemptError::NotARunDir(dir.clone()))?;
        let dag: Dag = serde_json::from_str(&std::fs::read_to_string(dir.join(DAG_FILE))?)?;
        Ok(Self {
            dir,
            dag_name: dag.name,
            run_id,
            created_at,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn dag_name(&self) -> &str {
        &self.dag_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dag_run(&self) -> DagRunRef {
        DagRunRef::new(self.dag_name.clone(), self.run_id.clone())
    }

    /// Re-read the persisted DAG snapshot.
    pub fn dag(&self) -> Result<Dag, AttemptError> {
        Ok(serde_json::from_str(&std::fs::read_to_string(
            self.dir.join(DAG_FILE),
        )?)?)
    }

    /// The current status: last parseable line of `status.jsonl`.
    pub fn latest_status(&self) -> Result<Option<Status>, AttemptError> {
        Ok(read_latest_status(&self.dir.join(STATUS_FILE))?)
    }

    /// Every persisted status snapshot, oldest first.
    pub fn status_history(&self) -> Result<Vec<Status>, AttemptError> {
        Ok(crate::statuslog::read_all_statuses(
            &self.dir.join(STATUS_FILE),
        )?)
    }

    /// True while an exclusive writer holds this attempt.
    pub fn is_open(&self) -> bool {
        self.dir.join(LOCK_FILE).exists() && !self.is_closed()
    }

    /// True once the attempt has been finalized.
    pub fn is_closed(&self) -> bool {
        self.dir.join(CLOSED_FILE).exists()
    }

    /// True when the writer died without finalizing: the sentinel is still
    /// present but no process is appending. The run manager reconciles such
    /// attempts to Aborted.
    pub fn is_interrupted(&self) -> bool {
        self.is_open()
    }

    /// Acquire the exclusive writer for this attempt.
    ///
    /// Fails with [`AttemptError::AlreadyOpen`] while another writer holds
    /// the sentinel, and with [`AttemptError::Closed`] after finalize.
    pub fn open(&self) -> Result<AttemptWriter, AttemptError> {
        if self.is_closed() {
            return Err(AttemptError::Closed(self.dag_run()));
        }
        let lock_path = self.dir.join(LOCK_FILE);
        let mut lock = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(AttemptError::AlreadyOpen(self.dag_run()));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(lock, "{}", std::process::id())?;
        lock.sync_all()?;

        let log = StatusLogWriter::open(&self.dir.join(STATUS_FILE))?;
        Ok(AttemptWriter {
            dir: self.dir.clone(),
            dag_run: self.dag_run(),
            log,
            closed: false,
        })
    }

    /// Move this attempt under the `.hidden/` sibling of its DAG directory.
    ///
    /// Hidden attempts keep their content (historical ordering is preserved)
    /// but drop out of every query.
    pub fn hide(self) -> Result<(), AttemptError> {
        let parent = self
            .dir
            .parent()
            .ok_or_else(|| AttemptError::NotARunDir(self.dir.clone()))?;
        let hidden = parent.join(HIDDEN_DIR);
        std::fs::create_dir_all(&hidden)?;
        let dir_name = self
            .dir
            .file_name()
            .ok_or_else(|| AttemptError::NotARunDir(self.dir.clone()))?;
        std::fs::rename(&self.dir, hidden.join(dir_name))?;
        Ok(())
    }

    /// Directory for sub-DAG attempts of this attempt.
    pub fn children_dir(&self) -> PathBuf {
        self.dir.join(CHILDREN_DIR)
    }
}

/// The exclusive writer over one attempt's status log.
#[derive(Debug)]
pub struct AttemptWriter {
    dir: PathBuf,
    dag_run: DagRunRef,
    log: StatusLogWriter,
    closed: bool,
}

impl AttemptWriter {
    /// Append a status snapshot.
    pub fn write(&mut self, status: &Status) -> Result<(), AttemptError> {
        self.log.append(status)?;
        self.log.flush()?;
        Ok(())
    }

    /// Finalize: fsync the log, then rename the open sentinel into the
    /// closed marker. After this the attempt is immutable.
    pub fn close(mut self) -> Result<(), AttemptError> {
        self.log.sync()?;
        std::fs::rename(self.dir.join(LOCK_FILE), self.dir.join(CLOSED_FILE))?;
        self.closed = true;
        Ok(())
    }

    pub fn dag_run(&self) -> &DagRunRef {
        &self.dag_run
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }
}

// An unclosed writer leaves `attempt.lock` behind on purpose: after a crash
// the surviving sentinel is what marks the attempt as interrupted.

/// Write a JSON document via temp file + rename.
pub(crate) fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), AttemptError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        serde_json::to_writer(&mut file, value)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "attempt_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process registry: filesystem-backed proc-group locks and
//! liveness-tested run handles.
//!
//! Each proc group is a directory; each live run is one `.proc` file inside
//! it, created with `O_CREAT|O_EXCL`. The group lock is an advisory lock on
//! `group.lock`, so it is released by the OS when the holder dies. The
//! pattern everywhere is `lock → count → decide → acquire → unlock`;
//! releasing a handle does not require the lock.

use dagrun_core::{safe_name, DagRunRef};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, warn};

/// Default TTL after which a handle with no heartbeat is considered stale.
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(300);

/// Errors from proc-store operations
#[derive(Debug, Error)]
pub enum ProcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("proc group {0} is locked by another admitter")]
    Contended(String),
    #[error("handle already exists for {0}")]
    HandleExists(DagRunRef),
}

/// Contents of one handle file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcEntry {
    pub pid: u32,
    pub hostname: String,
    pub dag_name: String,
    pub run_id: String,
    pub started_at_ms: u64,
}

/// Non-blocking advisory lock over one proc group.
///
/// Unlocked on drop (and by the OS if the holder crashes).
pub struct GroupLock {
    file: File,
    group: String,
}

impl GroupLock {
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl Drop for GroupLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(group = %self.group, error = %e, "failed to release group lock");
        }
    }
}

/// A live claim over one (proc_group, dag_run) pair.
///
/// The handle file's existence plus a passing liveness check is what counts
/// toward `max_active_runs`. Must be released on every exit path; an
/// unreleased handle removes its file best-effort on Drop.
#[derive(Debug)]
pub struct ProcHandle {
    path: PathBuf,
    dag_run: DagRunRef,
    released: bool,
}

impl ProcHandle {
    pub fn dag_run(&self) -> &DagRunRef {
        &self.dag_run
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Refresh the handle's mtime so cross-host readers keep counting it.
    pub fn heartbeat(&self) -> Result<(), ProcError> {
        touch_handle(&self.path)
    }

    /// Release the claim.
    pub fn stop(mut self) -> Result<(), ProcError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ProcHandle {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Filesystem-backed process registry.
#[derive(Debug, Clone)]
pub struct ProcStore {
    root: PathBuf,
    stale_ttl: Duration,
}

impl ProcStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stale_ttl: DEFAULT_STALE_TTL,
        }
    }

    pub fn with_stale_ttl(mut self, ttl: Duration) -> Self {
        self.stale_ttl = ttl;
        self
    }

    fn group_dir(&self, group: &str) -> PathBuf {
        self.root.join(safe_name(group))
    }

    /// Per-run control socket path for the agent owning a run.
    pub fn socket_path(&self, group: &str, run_id: &str) -> PathBuf {
        self.group_dir(group).join(format!("{run_id}.sock"))
    }

    /// Try to take the group lock without blocking.
    pub fn try_lock(&self, group: &str) -> Result<GroupLock, ProcError> {
        let dir = self.group_dir(group);
        std::fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.join("group.lock"))?;
        if file.try_lock_exclusive().is_err() {
            return Err(ProcError::Contended(group.to_string()));
        }
        Ok(GroupLock {
            file,
            group: group.to_string(),
        })
    }

    /// Create the handle file for `(group, dag_run)` exclusively.
    pub fn acquire(&self, group: &str, dag_run: &DagRunRef) -> Result<ProcHandle, ProcError> {
        let dir = self.group_dir(group);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(handle_file_name(dag_run));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ProcError::HandleExists(dag_run.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let entry = ProcEntry {
            pid: std::process::id(),
            hostname: hostname(),
            dag_name: dag_run.name.clone(),
            run_id: dag_run.run_id.as_str().to_string(),
            started_at_ms: epoch_ms_now(),
        };
        file.write_all(&serde_json::to_vec(&entry)?)?;
        file.sync_all()?;
        debug!(group, dag_run = %dag_run, "acquired proc handle");

        Ok(ProcHandle {
            path,
            dag_run: dag_run.clone(),
            released: false,
        })
    }

    /// Count live handles in a group, purging stale entries in place.
    pub fn count_alive(&self, group: &str) -> Result<usize, ProcError> {
        self.count_alive_filtered(group, None)
    }

    /// Count live handles for one DAG within a group.
    pub fn count_alive_by_dag_name(&self, group: &str, dag_name: &str) -> Result<usize, ProcError> {
        self.count_alive_filtered(group, Some(dag_name))
    }

    fn count_alive_filtered(
        &self,
        group: &str,
        dag_name: Option<&str>,
    ) -> Result<usize, ProcError> {
        let dir = self.group_dir(group);
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut alive = 0;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("proc") {
                continue;
            }
            let parsed: Option<ProcEntry> = std::fs::read_to_string(&path)
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok());
            let Some(proc_entry) = parsed else {
                // Unreadable entry: fall back to the mtime TTL
                if self.mtime_stale(&entry)? {
                    warn!(path = %path.display(), "purging unreadable stale proc entry");
                    let _ = std::fs::remove_file(&path);
                }
                continue;
            };

            if !self.entry_alive(&proc_entry, &entry)? {
                debug!(path = %path.display(), pid = proc_entry.pid, "purging dead proc entry");
                let _ = std::fs::remove_file(&path);
                continue;
            }
            if dag_name.map_or(true, |n| proc_entry.dag_name == n) {
                alive += 1;
            }
        }
        Ok(alive)
    }

    /// Liveness: on the owning host a signal-0 probe decides; foreign hosts
    /// fall back to the heartbeat TTL.
    fn entry_alive(&self, entry: &ProcEntry, dirent: &std::fs::DirEntry) -> Result<bool, ProcError> {
        if entry.hostname == hostname() {
            return Ok(pid_alive(entry.pid));
        }
        Ok(!self.mtime_stale(dirent)?)
    }

    fn mtime_stale(&self, dirent: &std::fs::DirEntry) -> Result<bool, ProcError> {
        let mtime = dirent.metadata()?.modified()?;
        let age = SystemTime::now()
            .duration_since(mtime)
            .unwrap_or(Duration::ZERO);
        Ok(age > self.stale_ttl)
    }
}

/// Refresh a handle file's mtime (the heartbeat observed by readers).
pub fn touch_handle(path: &Path) -> Result<(), ProcError> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::now())?;
    Ok(())
}

fn handle_file_name(dag_run: &DagRunRef) -> String {
    format!(
        "{}_{}.proc",
        safe_name(&dag_run.name),
        dag_run.run_id.as_str()
    )
}

fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Local hostname, falling back to "localhost".
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

/// Probe a pid with signal 0.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // No cheap probe off unix; the mtime TTL governs
    true
}

#[cfg(test)]
#[path = "proc_tests.rs"]
mod tests;

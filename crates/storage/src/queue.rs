// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue store: a named FIFO of deferred runs.
//!
//! One file per item; the filename encodes the enqueue time plus a monotonic
//! suffix so lexicographic order is FIFO order. Dequeue claims an item by
//! renaming it into a `.taken` sibling: atomic, at-least-once; callers key
//! idempotency on the run id.

use dagrun_core::{Dag, DagRunRef};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::debug;

const TAKEN_DIR: &str = ".taken";

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One deferred run: the DAG + params snapshot needed to admit it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_name: String,
    pub dag_run: DagRunRef,
    pub enqueued_at_ms: u64,
    pub dag: Dag,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub params: String,
}

/// Filesystem-backed FIFO queues.
#[derive(Debug)]
pub struct QueueStore {
    root: PathBuf,
    seq: AtomicU64,
}

impl Clone for QueueStore {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            seq: AtomicU64::new(self.seq.load(Ordering::SeqCst)),
        }
    }
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    fn queue_dir(&self, queue: &str) -> PathBuf {
        self.root.join(dagrun_core::safe_name(queue))
    }

    /// Append an item to the queue. Always succeeds (barring I/O failure).
    pub fn enqueue(&self, queue: &str, item: &QueueItem) -> Result<(), QueueError> {
        let dir = self.queue_dir(queue);
        std::fs::create_dir_all(&dir)?;

        // Retry on the (unlikely) filename collision between processes
        loop {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            let name = format!(
                "{:013}_{:06}_{}.json",
                item.enqueued_at_ms,
                seq % 1_000_000,
                item.dag_run.run_id
            );
            let path = dir.join(&name);
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => {
                    serde_json::to_writer(&file, item)?;
                    file.sync_all()?;
                    debug!(queue, dag_run = %item.dag_run, file = %name, "enqueued");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove and return the head of the queue, or `None` when empty.
    pub fn dequeue(&self, queue: &str) -> Result<Option<QueueItem>, QueueError> {
        loop {
            let Some(path) = self.ordered_item_paths(queue)?.into_iter().next() else {
                return Ok(None);
            };
            match self.claim(&path)? {
                Some(item) => return Ok(Some(item)),
                None => continue, // raced with another dequeuer; take the next head
            }
        }
    }

    /// Remove and return the item for a specific run, or `None`.
    pub fn dequeue_run(
        &self,
        queue: &str,
        dag_run: &DagRunRef,
    ) -> Result<Option<QueueItem>, QueueError> {
        for path in self.ordered_item_paths(queue)? {
            let matches = self
                .peek(&path)?
                .map_or(false, |item| item.dag_run == *dag_run);
            if !matches {
                continue;
            }
            if let Some(item) = self.claim(&path)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Items for one DAG, FIFO order, without removing them.
    pub fn list_by_dag_name(
        &self,
        queue: &str,
        dag_name: &str,
    ) -> Result<Vec<QueueItem>, QueueError> {
        let mut items = Vec::new();
        for path in self.ordered_item_paths(queue)? {
            if let Some(item) = self.peek(&path)? {
                if item.dag_run.name == dag_name {
                    items.push(item);
                }
            }
        }
        Ok(items)
    }

    /// Number of items waiting in the queue.
    pub fn len(&self, queue: &str) -> Result<usize, QueueError> {
        Ok(self.ordered_item_paths(queue)?.len())
    }

    pub fn is_empty(&self, queue: &str) -> Result<bool, QueueError> {
        Ok(self.len(queue)? == 0)
    }

    /// Queue names with at least one waiting item.
    pub fn queue_names(&self) -> Result<Vec<String>, QueueError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') && !self.is_empty(name)? {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Claim an item file by renaming it aside, then read and delete it.
    ///
    /// Returns `None` when another dequeuer claimed it first.
    fn claim(&self, path: &std::path::Path) -> Result<Option<QueueItem>, QueueError> {
        let Some(parent) = path.parent() else {
            return Ok(None);
        };
        let Some(name) = path.file_name() else {
            return Ok(None);
        };
        let taken_dir = parent.join(TAKEN_DIR);
        std::fs::create_dir_all(&taken_dir)?;
        let claimed = taken_dir.join(name);
        match std::fs::rename(path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let item: QueueItem = serde_json::from_str(&std::fs::read_to_string(&claimed)?)?;
        std::fs::remove_file(&claimed)?;
        Ok(Some(item))
    }

    fn peek(&self, path: &std::path::Path) -> Result<Option<QueueItem>, QueueError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn ordered_item_paths(&self, queue: &str) -> Result<Vec<PathBuf>, QueueError> {
        let dir = self.queue_dir(queue);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json")
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

/// Milliseconds since the UNIX epoch, for enqueue stamps.
pub fn enqueue_stamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL status log.
//!
//! One complete JSON status document per line. The current status is the
//! last parseable line: writers append without reading, and readers recover
//! from a torn final line (crash mid-write) by scanning backwards.

use dagrun_core::Status;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from status-log operations
#[derive(Debug, Error)]
pub enum StatusLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exclusive appender for one `status.jsonl`.
///
/// The exclusivity is enforced by the attempt sentinel, not here; this type
/// only guarantees line-atomic appends and a durable close.
#[derive(Debug)]
pub struct StatusLogWriter {
    file: File,
    path: PathBuf,
}

impl StatusLogWriter {
    /// Open the log for appending, creating it if missing.
    pub fn open(path: &Path) -> Result<Self, StatusLogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    /// Append one status snapshot as a single line.
    ///
    /// The line is written with its trailing newline in one `write_all` so a
    /// crash can tear at most the final line.
    pub fn append(&mut self, status: &Status) -> Result<(), StatusLogError> {
        let mut line = serde_json::to_vec(status)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        Ok(())
    }

    /// Flush appended lines to the OS.
    pub fn flush(&mut self) -> Result<(), StatusLogError> {
        self.file.flush()?;
        Ok(())
    }

    /// Durability point: fsync the log.
    pub fn sync(&mut self) -> Result<(), StatusLogError> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read the current status: the last parseable line of the log.
///
/// Returns `Ok(None)` for a missing or empty file. A torn or corrupt tail
/// line is skipped with a warning; the scan continues backwards.
pub fn read_latest_status(path: &Path) -> Result<Option<Status>, StatusLogError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    for line in content.lines().rev() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(status) => return Ok(Some(status)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable status line");
            }
        }
    }
    Ok(None)
}

/// Read every parseable status line, oldest first.
///
/// Unparseable lines are skipped; used by retry (to replay node state) and
/// by tests asserting the full transition history.
pub fn read_all_statuses(path: &Path) -> Result<Vec<Status>, StatusLogError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut statuses = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(status) => statuses.push(status),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable status line");
            }
        }
    }
    Ok(statuses)
}

#[cfg(test)]
#[path = "statuslog_tests.rs"]
mod tests;

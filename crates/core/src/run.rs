// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `DagRunRef` and the run-directory naming scheme.

use crate::id::RunId;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to one DAG run: `(name, run_id)`.
///
/// Runs reference their parent and root runs by value of this type, never by
/// owning pointers; lookups go through the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DagRunRef {
    pub name: String,
    pub run_id: RunId,
}

impl DagRunRef {
    pub fn new(name: impl Into<String>, run_id: impl Into<RunId>) -> Self {
        Self {
            name: name.into(),
            run_id: run_id.into(),
        }
    }
}

impl std::fmt::Display for DagRunRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.run_id)
    }
}

/// Errors from parsing a `<name>:<run-id>` reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefParseError {
    #[error("expected <name>:<run-id>, got {0:?}")]
    MissingSeparator(String),
    #[error("empty name in {0:?}")]
    EmptyName(String),
    #[error("empty run id in {0:?}")]
    EmptyRunId(String),
}

impl std::str::FromStr for DagRunRef {
    type Err = RefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, id) = s
            .split_once(':')
            .ok_or_else(|| RefParseError::MissingSeparator(s.to_string()))?;
        if name.is_empty() {
            return Err(RefParseError::EmptyName(s.to_string()));
        }
        if id.is_empty() {
            return Err(RefParseError::EmptyRunId(s.to_string()));
        }
        Ok(Self::new(name, id))
    }
}

/// Timestamp format embedded in run-directory names.
///
/// UTC, second resolution, `Z`-suffixed so lexicographic sort equals
/// chronological sort: `20260314_153045Z`.
const RUN_TS_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Format a creation time for use in a run-directory name.
pub fn format_run_timestamp(created_at: DateTime<Utc>) -> String {
    format!("{}Z", created_at.format(RUN_TS_FORMAT))
}

/// Build the run-directory name: `<timestamp>_<run-id>`.
pub fn run_dir_name(created_at: DateTime<Utc>, run_id: &RunId) -> String {
    format!("{}_{}", format_run_timestamp(created_at), run_id)
}

/// Split a run-directory name back into `(created_at, run_id)`.
///
/// Returns `None` for names that don't follow the scheme (foreign files in
/// the store root are skipped, not errored on).
pub fn parse_run_dir_name(dir_name: &str) -> Option<(DateTime<Utc>, RunId)> {
    // <YYYYmmdd>_<HHMMSS>Z_<run-id>
    let mut parts = dir_name.splitn(3, '_');
    let date = parts.next()?;
    let time = parts.next()?;
    let run_id = parts.next()?;
    let time = time.strip_suffix('Z')?;
    if run_id.is_empty() {
        return None;
    }
    let ts = NaiveDateTime::parse_from_str(&format!("{date}_{time}"), RUN_TS_FORMAT).ok()?;
    Some((ts.and_utc(), RunId::new(run_id)))
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

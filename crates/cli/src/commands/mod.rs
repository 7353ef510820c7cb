// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One module per CLI verb.

pub mod cleanup;
pub mod coordinator;
pub mod dequeue;
pub mod enqueue;
pub mod exec;
pub mod history;
pub mod migrate;
pub mod restart;
pub mod retry;
pub mod start;
pub mod status;
pub mod stop;
pub mod worker;

use dagrun_engine::{AdmissionError, ManagerError};
use std::process::ExitCode;

/// Exit code for admission refusals (`start`/`exec`/`enqueue`).
pub const EXIT_ADMISSION: u8 = 2;

/// Map a manager error to the admission exit code when it is a refusal.
pub fn admission_exit(err: &ManagerError) -> Option<ExitCode> {
    match err {
        ManagerError::Admission(e) if e.is_refusal() => Some(ExitCode::from(EXIT_ADMISSION)),
        _ => None,
    }
}

/// Same, for a raw admission error.
pub fn admission_exit_raw(err: &AdmissionError) -> Option<ExitCode> {
    if err.is_refusal() {
        Some(ExitCode::from(EXIT_ADMISSION))
    } else {
        None
    }
}

/// Parse a `key=value` pair (labels, env vars).
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

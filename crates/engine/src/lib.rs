// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dagrun-engine: admission, run management, and the local run agent.
//!
//! The engine is the policy layer over the storage crate: the admission
//! controller decides execute-now / enqueue / reject, the run manager
//! resolves status and drives stop/restart/retry, and the agent executes
//! one attempt end to end while serving its per-run control socket.

pub mod admission;
pub mod agent;
pub mod error;
pub mod manager;
pub mod sock;

pub use admission::{Admission, AdmitOptions, Decision};
pub use agent::{execute_run, AgentConfig, LocalRunner, StatusSink};
pub use error::{AdmissionError, AgentError, ManagerError};
pub use manager::{RunManager, StartOutcome};
pub use sock::{query_status, send_stop, ControlServer};

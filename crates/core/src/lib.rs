// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dagrun-core: shared types for the DAG-run lifecycle core

pub mod clock;
pub mod dag;
pub mod id;
pub mod namespace;
pub mod run;
pub mod status;

pub use clock::{Clock, SystemClock};
pub use dag::{Dag, HandlerSet, Step};
pub use id::{validate_run_id, IdGen, RunId, RunIdError, SequentialIdGen, UuidIdGen};
pub use namespace::{safe_name, Namespace, NamespaceError};
pub use run::{format_run_timestamp, parse_run_dir_name, run_dir_name, DagRunRef, RefParseError};
pub use status::{Node, NodePhase, Phase, Status, Trigger};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;

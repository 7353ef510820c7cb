// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dagrun-storage: filesystem-backed stores for the run lifecycle.
//!
//! Every store in this crate coordinates across processes through
//! filesystem atomicity alone: `O_CREAT|O_EXCL` for exclusive creation,
//! `rename` for finalize/hide/claim, and an advisory lock for the
//! proc-group critical section. No store holds more than one lock at a
//! time, so lock-ordering deadlocks cannot arise.

pub mod attempt;
pub mod migration;
pub mod paths;
pub mod proc;
pub mod queue;
pub mod registry;
pub mod runstore;
pub mod statuslog;

pub use attempt::{Attempt, AttemptError, AttemptWriter};
pub use migration::{MigrationError, MigrationReport, Migrator};
pub use paths::DataDirs;
pub use proc::{GroupLock, ProcEntry, ProcError, ProcHandle, ProcStore};
pub use queue::{QueueError, QueueItem, QueueStore};
pub use registry::{CoordinatorEndpoint, RegistryError, ServiceAd, ServiceRegistry};
pub use runstore::{CreateOptions, ListFilter, RunStore, StoreError};
pub use statuslog::{read_all_statuses, read_latest_status, StatusLogError, StatusLogWriter};

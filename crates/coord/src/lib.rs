// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dagrun-coord: the coordinator/worker task broker.
//!
//! Agents dispatch tasks; workers long-poll for them. Matching is by
//! required labels, FIFO among waiting pollers. Dispatched tasks unacked
//! within the ack window requeue for another poller; workers keep reports
//! idempotent on the task id.

pub mod broker;
pub mod client;
pub mod endpoints;
pub mod proto;
pub mod server;
pub mod tls;
pub mod wire;
pub mod worker;

pub use broker::Broker;
pub use client::{CoordinatorClient, CoordError};
pub use endpoints::{CoordinatorEndpoints, RegistryEndpoints, StaticEndpoints};
pub use proto::{Request, Response, StatusUpdate, Task, TaskPhase, TaskState};
pub use server::CoordinatorServer;
pub use tls::TlsConfig;
pub use worker::{Worker, WorkerConfig};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun worker`: poll the coordinator and execute claimed tasks.

use crate::context::AppContext;
use clap::Args;
use dagrun_coord::{CoordinatorClient, Worker, WorkerConfig};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args)]
pub struct WorkerArgs {
    /// Worker id override (default: hostname@pid)
    #[arg(long = "worker-id")]
    pub worker_id: Option<String>,

    /// Advertised label (repeatable: k=v)
    #[arg(long = "label", value_parser = super::parse_key_value)]
    pub labels: Vec<(String, String)>,

    /// Concurrent pollers / runs
    #[arg(long = "max-active-runs", default_value_t = 1)]
    pub max_active_runs: usize,

    /// Static coordinator endpoints (repeatable); default: service registry
    #[arg(long = "coordinator", value_name = "HOST:PORT")]
    pub coordinators: Vec<String>,

    /// Execute from task payloads only; touch no local store
    #[arg(long = "shared-nothing")]
    pub shared_nothing: bool,

    /// Long-poll window in seconds
    #[arg(long = "poll-timeout", default_value_t = 30)]
    pub poll_timeout_secs: u64,

    /// Grace period for in-flight runs on shutdown, in seconds
    #[arg(long = "shutdown-timeout", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,
}

pub async fn run(ctx: &AppContext, args: WorkerArgs) -> anyhow::Result<ExitCode> {
    let client = CoordinatorClient::new(
        ctx.endpoint_source(&args.coordinators),
        &ctx.config.tls,
    )?;

    let cfg = WorkerConfig {
        worker_id: args.worker_id,
        labels: args.labels.into_iter().collect(),
        max_active_runs: args.max_active_runs.max(1),
        poll_timeout: Duration::from_secs(args.poll_timeout_secs),
        shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        shared_nothing: args.shared_nothing,
        log_root: ctx.dirs.logs_dir(),
        shell: ctx.config.shell.clone(),
    };

    Worker::new(client, ctx.manager.clone(), cfg)
        .run(ctx.cancel.clone())
        .await;
    Ok(ExitCode::SUCCESS)
}

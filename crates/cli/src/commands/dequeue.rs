// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun dequeue <queue> [--dag-run <name>:<id>]`

use crate::context::AppContext;
use clap::Args;
use dagrun_core::DagRunRef;
use std::process::ExitCode;

#[derive(Args)]
pub struct DequeueArgs {
    /// Queue name
    pub queue: String,

    /// Specific run to remove; the queue head when omitted
    #[arg(long = "dag-run", value_name = "NAME:RUN-ID")]
    pub dag_run: Option<String>,
}

pub async fn run(ctx: &AppContext, args: DequeueArgs) -> anyhow::Result<ExitCode> {
    let item = match &args.dag_run {
        Some(reference) => {
            let dag_run: DagRunRef = reference.parse()?;
            ctx.manager.dequeue_abort(&args.queue, &dag_run)?
        }
        None => match ctx.manager.dequeue_abort_head(&args.queue)? {
            Some(item) => item,
            None => {
                if !ctx.quiet {
                    println!("queue {} is empty", args.queue);
                }
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    if !ctx.quiet {
        println!("dequeued {} (aborted)", item.dag_run);
    }
    Ok(ExitCode::SUCCESS)
}

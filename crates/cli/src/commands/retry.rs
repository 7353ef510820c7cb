// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun retry --run-id <id> <dag> [--step <name>]`

use crate::context::AppContext;
use crate::output;
use clap::Args;
use dagrun_core::DagRunRef;
use dagrun_engine::StartOutcome;
use std::process::ExitCode;

#[derive(Args)]
pub struct RetryArgs {
    /// DAG name or path to a dag.json snapshot
    pub dag: String,

    /// Run to retry
    #[arg(long = "run-id", required = true)]
    pub run_id: String,

    /// Re-execute only this step
    #[arg(long)]
    pub step: Option<String>,
}

pub async fn run(ctx: &AppContext, args: RetryArgs) -> anyhow::Result<ExitCode> {
    let name = ctx
        .load_dag(&args.dag)
        .map(|d| d.name)
        .unwrap_or_else(|_| args.dag.clone());
    let dag_run = DagRunRef::new(name, args.run_id);

    let outcome = ctx.manager.retry(&dag_run, args.step.as_deref())?;
    let StartOutcome::Execute {
        attempt,
        handle,
        status,
    } = outcome
    else {
        anyhow::bail!("retry did not yield an executable attempt");
    };

    // Execute against the snapshot the run was originally recorded with
    let dag = attempt.dag()?;
    let mut cfg = ctx.agent_config(&dag, status.run_id.as_str());
    cfg.step_filter = args.step;
    let phase = ctx.run_local(&dag, &attempt, handle, status, cfg).await?;

    if !ctx.quiet {
        if let Ok(Some(final_status)) = attempt.latest_status() {
            println!("{}", output::render_status(&final_status));
        }
    }
    Ok(
        if phase == dagrun_core::Phase::Succeeded
            || phase == dagrun_core::Phase::PartiallySucceeded
        {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        },
    )
}

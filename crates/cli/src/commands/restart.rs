// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun restart <dag>`

use crate::context::AppContext;
use crate::output;
use clap::Args;
use dagrun_core::DagRunRef;
use dagrun_engine::StartOutcome;
use std::process::ExitCode;

#[derive(Args)]
pub struct RestartArgs {
    /// DAG name or path to a dag.json snapshot
    pub dag: String,

    /// Run to restart (latest when omitted)
    #[arg(long = "run-id")]
    pub run_id: Option<String>,
}

pub async fn run(ctx: &AppContext, args: RestartArgs) -> anyhow::Result<ExitCode> {
    let dag = ctx.load_dag(&args.dag)?;
    let dag_run = match args.run_id {
        Some(run_id) => DagRunRef::new(dag.name.clone(), run_id),
        None => {
            let latest = ctx
                .manager
                .admission()
                .runs()
                .latest_attempt(&dag.name)?;
            latest.dag_run()
        }
    };

    match ctx.manager.restart(&dag, &dag_run).await? {
        StartOutcome::Enqueued(new_run) => {
            if !ctx.quiet {
                println!("queued {new_run}");
            }
            Ok(ExitCode::SUCCESS)
        }
        StartOutcome::Execute {
            attempt,
            handle,
            status,
        } => {
            let cfg = ctx.agent_config(&dag, status.run_id.as_str());
            let phase = ctx.run_local(&dag, &attempt, handle, status, cfg).await?;
            if !ctx.quiet {
                if let Ok(Some(final_status)) = attempt.latest_status() {
                    println!("{}", output::render_status(&final_status));
                }
            }
            Ok(if phase == dagrun_core::Phase::Succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

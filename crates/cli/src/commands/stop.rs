// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun stop <dag>`

use crate::context::AppContext;
use clap::Args;
use dagrun_core::DagRunRef;
use dagrun_engine::manager::STOP_DEADLINE;
use std::process::ExitCode;

#[derive(Args)]
pub struct StopArgs {
    /// DAG name
    pub dag: String,

    /// Run to stop (latest when omitted)
    #[arg(long = "run-id")]
    pub run_id: Option<String>,
}

pub async fn run(ctx: &AppContext, args: StopArgs) -> anyhow::Result<ExitCode> {
    let name = ctx
        .load_dag(&args.dag)
        .map(|d| d.name)
        .unwrap_or_else(|_| args.dag.clone());
    let dag_run = match args.run_id {
        Some(run_id) => DagRunRef::new(name, run_id),
        None => ctx
            .manager
            .admission()
            .runs()
            .latest_attempt(&name)?
            .dag_run(),
    };

    ctx.manager.stop_and_wait(&dag_run, STOP_DEADLINE).await?;
    if !ctx.quiet {
        println!("stopped {dag_run}");
    }
    Ok(ExitCode::SUCCESS)
}

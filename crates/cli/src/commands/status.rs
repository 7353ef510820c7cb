// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun status <dag>`

use crate::context::AppContext;
use crate::output;
use clap::Args;
use dagrun_core::DagRunRef;
use std::process::ExitCode;

#[derive(Args)]
pub struct StatusArgs {
    /// DAG name
    pub dag: String,

    /// Specific run (latest when omitted)
    #[arg(long = "run-id")]
    pub run_id: Option<String>,
}

pub async fn run(ctx: &AppContext, args: StatusArgs) -> anyhow::Result<ExitCode> {
    let name = ctx
        .load_dag(&args.dag)
        .map(|d| d.name)
        .unwrap_or_else(|_| args.dag.clone());

    let status = match args.run_id {
        Some(run_id) => {
            ctx.manager
                .current_status(&DagRunRef::new(name, run_id))
                .await?
        }
        None => ctx.manager.latest_status(&name).await?,
    };

    if !ctx.quiet {
        println!("{}", output::render_status(&status));
    }
    Ok(ExitCode::SUCCESS)
}

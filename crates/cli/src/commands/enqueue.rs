// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun enqueue <dag>`

use crate::context::AppContext;
use chrono::Utc;
use clap::Args;
use dagrun_core::{IdGen, RunId, UuidIdGen};
use std::process::ExitCode;

#[derive(Args)]
pub struct EnqueueArgs {
    /// DAG name or path to a dag.json snapshot
    pub dag: String,

    /// Parameter string recorded with the run
    #[arg(long)]
    pub params: Option<String>,

    /// Run ID to assign (UUIDv7 when omitted)
    #[arg(long = "workflow-id")]
    pub workflow_id: Option<String>,
}

pub async fn run(ctx: &AppContext, args: EnqueueArgs) -> anyhow::Result<ExitCode> {
    let dag = ctx.load_dag(&args.dag)?;
    let run_id = args
        .workflow_id
        .map(RunId::new)
        .unwrap_or_else(|| RunId::new(UuidIdGen.next()));
    let params = args.params.unwrap_or_else(|| dag.params.clone());

    match ctx
        .manager
        .admission()
        .enqueue_run(&dag, &run_id, Utc::now(), &params)
    {
        Ok(dag_run) => {
            if !ctx.quiet {
                println!("queued {dag_run}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if let Some(code) = super::admission_exit_raw(&e) {
                if !ctx.quiet {
                    eprintln!("dagrun: {e}");
                }
                return Ok(code);
            }
            Err(e.into())
        }
    }
}

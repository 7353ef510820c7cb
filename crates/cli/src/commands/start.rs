// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun start <dag> [-- params…]`

use crate::context::AppContext;
use crate::output;
use clap::Args;
use dagrun_core::{DagRunRef, RunId, Trigger};
use dagrun_engine::{AdmitOptions, StartOutcome};
use std::process::ExitCode;

#[derive(Args)]
pub struct StartArgs {
    /// DAG name or path to a dag.json snapshot
    pub dag: String,

    /// Run ID to assign (UUIDv7 when omitted)
    #[arg(long = "run-id")]
    pub run_id: Option<String>,

    /// Parameter string recorded with the run
    #[arg(long)]
    pub params: Option<String>,

    /// Reject instead of enqueueing when the DAG is at capacity
    #[arg(long = "no-queue")]
    pub no_queue: bool,

    /// Root DAG-run reference (<name>:<run-id>) for sub-DAG runs
    #[arg(long)]
    pub root: Option<String>,

    /// Parent DAG-run reference (<name>:<run-id>) for sub-DAG runs
    #[arg(long)]
    pub parent: Option<String>,

    /// Positional params after `--`
    #[arg(last = true)]
    pub params_tail: Vec<String>,
}

pub async fn run(ctx: &AppContext, args: StartArgs) -> anyhow::Result<ExitCode> {
    let dag = ctx.load_dag(&args.dag)?;
    let params = match &args.params {
        Some(params) => params.clone(),
        None if !args.params_tail.is_empty() => args.params_tail.join(" "),
        None => dag.params.clone(),
    };
    let root = parse_ref(args.root.as_deref())?;
    let parent = parse_ref(args.parent.as_deref())?;
    let opts = AdmitOptions {
        queue_disabled: args.no_queue,
        singleton: false,
    }
    .from_env();

    let outcome = match ctx.manager.start_run(
        &dag,
        args.run_id.map(RunId::new),
        &params,
        Trigger::Manual,
        opts,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(code) = super::admission_exit(&e) {
                if !ctx.quiet {
                    eprintln!("dagrun: {e}");
                }
                return Ok(code);
            }
            return Err(e.into());
        }
    };

    match outcome {
        StartOutcome::Enqueued(dag_run) => {
            if !ctx.quiet {
                println!("queued {dag_run}");
            }
            Ok(ExitCode::SUCCESS)
        }
        StartOutcome::Execute {
            attempt,
            handle,
            mut status,
        } => {
            status.root = root;
            status.parent = parent;

            let cfg = ctx.agent_config(&dag, status.run_id.as_str());
            let phase = ctx
                .run_local(&dag, &attempt, handle, status, cfg)
                .await?;

            if !ctx.quiet {
                if let Ok(Some(final_status)) = attempt.latest_status() {
                    println!("{}", output::render_status(&final_status));
                }
            }
            Ok(if phase == dagrun_core::Phase::Succeeded
                || phase == dagrun_core::Phase::PartiallySucceeded
            {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn parse_ref(s: Option<&str>) -> anyhow::Result<Option<DagRunRef>> {
    s.map(|s| s.parse::<DagRunRef>().map_err(Into::into)).transpose()
}

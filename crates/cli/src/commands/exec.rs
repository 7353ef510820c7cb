// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun exec [flags] -- <cmd> [args…]`
//!
//! Wraps one command in an anonymous single-step DAG and runs it through
//! the normal admission path: locally, or on a matching worker when
//! `--worker-label` is given.

use crate::context::AppContext;
use crate::output;
use clap::Args;
use dagrun_coord::{CoordinatorClient, Task, TaskPhase};
use dagrun_core::{Dag, DagRunRef, RunId, Step, Trigger, UuidIdGen};
use dagrun_engine::{AdmitOptions, StartOutcome};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args)]
pub struct ExecArgs {
    /// Extra environment (repeatable: -E KEY=VALUE)
    #[arg(short = 'E', long = "env", value_parser = super::parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Load environment from a dotenv file
    #[arg(long)]
    pub dotenv: Option<PathBuf>,

    /// Working directory for the command
    #[arg(long)]
    pub workdir: Option<String>,

    /// Shell to wrap the command in
    #[arg(long)]
    pub shell: Option<String>,

    /// Queue for deferred admission
    #[arg(long)]
    pub queue: Option<String>,

    /// Allow only one live run of this command
    #[arg(long)]
    pub singleton: bool,

    /// Require a worker with these labels (repeatable: k=v); dispatches
    /// through the coordinator
    #[arg(long = "worker-label", value_parser = super::parse_key_value)]
    pub worker_label: Vec<(String, String)>,

    /// Command and arguments
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

pub async fn run(ctx: &AppContext, args: ExecArgs) -> anyhow::Result<ExitCode> {
    let dag = build_dag(&args)?;
    let run_id = RunId::new(dagrun_core::IdGen::next(&UuidIdGen));

    if !args.worker_label.is_empty() {
        return dispatch_remote(ctx, dag, run_id, &args).await;
    }

    // exec --singleton with queues disabled rejects rather than queueing
    let opts = AdmitOptions {
        queue_disabled: !ctx.config.queues.enabled,
        singleton: args.singleton,
    }
    .from_env();

    let outcome = match ctx
        .manager
        .start_run(&dag, Some(run_id), "", Trigger::Manual, opts)
    {
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

fn build_dag(args: &ExecArgs) -> anyhow::Result<Dag> {
    let program = args
        .command
        .first()
        .ok_or_else(|| anyhow::anyhow!("empty command"))?;
    let basename = program.rsplit('/').next().unwrap_or(program);

    let mut env: Vec<String> = Vec::new();
    if let Some(dotenv) = &args.dotenv {
        env.extend(load_dotenv(dotenv)?);
    }
    env.extend(args.env.iter().map(|(k, v)| format!("{k}={v}")));

    let step = Step {
        workdir: args.workdir.clone(),
        env,
        shell: args.shell.clone(),
        ..Step::command("exec", args.command.clone())
    };
    let mut dag = Dag::new(format!("exec-{}", dagrun_core::safe_name(basename)), vec![step]);
    if let Some(queue) = &args.queue {
        dag.queue = queue.clone();
    }
    if args.singleton {
        dag.max_active_runs = 1;
    }
    Ok(dag)
}

/// Minimal dotenv: `KEY=VALUE` lines, `#` comments, blanks ignored.
fn load_dotenv(path: &PathBuf) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && line.contains('='))
        .map(|line| line.trim_start_matches("export ").to_string())
        .collect())
}

/// Dispatch to the coordinator and follow the task to a terminal state.
async fn dispatch_remote(
    ctx: &AppContext,
    dag: Dag,
    run_id: RunId,
    args: &ExecArgs,
) -> anyhow::Result<ExitCode> {
    let client = CoordinatorClient::new(ctx.endpoint_source(&[]), &ctx.config.tls)?;

    let mut task = Task::new(DagRunRef::new(dag.name.clone(), run_id), dag, "");
    task.required_labels = args
        .worker_label
        .iter()
        .cloned()
        .collect::<BTreeMap<_, _>>();

    let task_id = client.dispatch(task).await?;
    if !ctx.quiet {
        println!("dispatched task {task_id}");
    }

    let mut cancel = ctx.cancel.clone();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            _ = cancel.changed() => {
                anyhow::bail!("interrupted while waiting for task {task_id}");
            }
        }
        let state = client.get_task(&task_id).await?;
        if state.phase != TaskPhase::Finished {
            continue;
        }
        if let Some(error) = state.error {
            if !ctx.quiet {
                eprintln!("dagrun: {error}");
            }
            return Ok(ExitCode::FAILURE);
        }
        let Some(status) = state.last_status else {
            return Ok(ExitCode::FAILURE);
        };
        if !ctx.quiet {
            println!("{}", output::render_status(&status));
        }
        return Ok(if status.phase == dagrun_core::Phase::Succeeded {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }
}

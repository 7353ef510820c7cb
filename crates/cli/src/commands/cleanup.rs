// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun cleanup <dag> [--retention-days N] [--dry-run] [--yes]`

use crate::context::AppContext;
use chrono::Utc;
use clap::Args;
use std::io::Write as _;
use std::process::ExitCode;

#[derive(Args)]
pub struct CleanupArgs {
    /// DAG name
    pub dag: String,

    /// Remove runs older than this many days
    #[arg(long = "retention-days", default_value_t = 30)]
    pub retention_days: u32,

    /// Show what would be removed without removing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub async fn run(ctx: &AppContext, args: CleanupArgs) -> anyhow::Result<ExitCode> {
    let name = ctx
        .load_dag(&args.dag)
        .map(|d| d.name)
        .unwrap_or_else(|_| args.dag.clone());
    let runs = ctx.manager.admission().runs();

    let expired = runs.list_expired(&name, args.retention_days, Utc::now())?;
    if expired.is_empty() {
        if !ctx.quiet {
            println!("nothing to remove for {name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !ctx.quiet || args.dry_run {
        for attempt in &expired {
            println!(
                "{} {} ({})",
                if args.dry_run { "would remove" } else { "removing" },
                attempt.dag_run(),
                attempt.created_at().format("%Y-%m-%d")
            );
        }
    }
    if args.dry_run {
        return Ok(ExitCode::SUCCESS);
    }

    if !args.yes && !confirm(&format!("remove {} run(s) of {name}?", expired.len()))? {
        if !ctx.quiet {
            println!("aborted");
        }
        return Ok(ExitCode::FAILURE);
    }

    let removed = runs.remove_old(&name, args.retention_days, Utc::now())?;
    if !ctx.quiet {
        println!("removed {} run(s) of {name}", removed.len());
    }
    Ok(ExitCode::SUCCESS)
}

/// Interactive yes/no prompt on stderr, defaulting to no.
pub(crate) fn confirm(question: &str) -> anyhow::Result<bool> {
    eprint!("{question} [y/N] ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

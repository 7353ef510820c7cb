// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun migrate namespace [--dry-run] [--yes]`

use crate::context::AppContext;
use clap::{Args, Subcommand};
use dagrun_storage::Migrator;
use std::process::ExitCode;

#[derive(Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
}

#[derive(Subcommand)]
pub enum MigrateCommand {
    /// Relocate legacy flat layouts into the ns/<id> scheme
    Namespace {
        /// Count what would move without moving anything
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

pub async fn run(ctx: &AppContext, args: MigrateArgs) -> anyhow::Result<ExitCode> {
    let MigrateCommand::Namespace { dry_run, yes } = args.command;

    let migrator = Migrator::new(ctx.dirs.root()).dry_run(dry_run);
    if !migrator.needs_migration()? {
        if !ctx.quiet {
            println!("no migration needed");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !dry_run && !yes {
        let question = format!(
            "migrate the data layout under {} to the namespace scheme?",
            ctx.dirs.root().display()
        );
        if !super::cleanup::confirm(&question)? {
            if !ctx.quiet {
                println!("aborted");
            }
            return Ok(ExitCode::FAILURE);
        }
    }

    let report = migrator.run()?;
    if !ctx.quiet {
        let verb = if dry_run { "would move" } else { "moved" };
        println!(
            "{verb} {} item(s), rewrote {} status log(s), tagged {} queue doc(s), {} warning(s)",
            report.moved, report.rewritten_logs, report.tagged_docs, report.warnings
        );
    }
    Ok(ExitCode::SUCCESS)
}

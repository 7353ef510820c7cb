// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun history [dag] [filters…]`

use crate::context::AppContext;
use crate::output;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use dagrun_core::Phase;
use dagrun_storage::ListFilter;
use std::process::ExitCode;

#[derive(Args)]
pub struct HistoryArgs {
    /// Restrict to one DAG
    pub dag: Option<String>,

    /// Window start (RFC 3339 or YYYY-MM-DD), inclusive
    #[arg(long)]
    pub from: Option<String>,

    /// Window end (RFC 3339 or YYYY-MM-DD), exclusive
    #[arg(long)]
    pub to: Option<String>,

    /// Only runs from the last duration (e.g. 90s, 30m, 1h, 2d)
    #[arg(long)]
    pub last: Option<String>,

    /// Phases to keep (repeatable, e.g. --status failed)
    #[arg(long = "status")]
    pub statuses: Vec<String>,

    /// Tags that must all be present (comma-separated)
    #[arg(long)]
    pub tags: Option<String>,

    /// Run-id prefix or substring
    #[arg(long = "run-id")]
    pub run_id: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: Format,

    /// Result cap
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Text,
    Json,
}

pub async fn run(ctx: &AppContext, args: HistoryArgs) -> anyhow::Result<ExitCode> {
    let mut filter = ListFilter {
        name: args.dag.clone(),
        run_id: args.run_id.clone(),
        limit: args.limit,
        ..Default::default()
    };

    filter.from = args.from.as_deref().map(parse_timestamp).transpose()?;
    filter.to = args.to.as_deref().map(parse_timestamp).transpose()?;
    if let Some(last) = &args.last {
        let window = parse_duration(last)?;
        filter.from = Some(Utc::now() - window);
    }
    for status in &args.statuses {
        let phase: Phase = status
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        filter.phases.push(phase);
    }
    if let Some(tags) = &args.tags {
        filter.tags = tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
    }

    let statuses = ctx
        .manager
        .admission()
        .runs()
        .list_statuses(&filter)?;

    if statuses.is_empty() {
        if !ctx.quiet {
            println!("No DAG runs found matching the specified filters.");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !ctx.quiet {
        match args.format {
            Format::Text => print!("{}", output::render_history(&statuses)),
            Format::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// RFC 3339 (`2026-03-14T12:00:00Z`) or bare date (`2026-03-14`, UTC midnight).
fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid timestamp {s:?} (want RFC 3339 or YYYY-MM-DD)"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow::anyhow!("invalid timestamp {s:?}"))
}

/// `<number><unit>` with s/m/h/d units.
fn parse_duration(s: &str) -> anyhow::Result<chrono::Duration> {
    let (value, unit) = s.split_at(s.len().saturating_sub(1));
    let n: i64 = value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration {s:?} (want e.g. 90s, 30m, 1h, 2d)"))?;
    match unit {
        "s" => Ok(chrono::Duration::seconds(n)),
        "m" => Ok(chrono::Duration::minutes(n)),
        "h" => Ok(chrono::Duration::hours(n)),
        "d" => Ok(chrono::Duration::days(n)),
        _ => Err(anyhow::anyhow!(
            "invalid duration {s:?} (want e.g. 90s, 30m, 1h, 2d)"
        )),
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rendering of statuses and run summaries.

use crate::table::{Column, Table};
use chrono::{DateTime, Utc};
use dagrun_core::{Node, Status};

/// One-line run header: `name run-id phase`.
pub fn status_line(status: &Status) -> String {
    format!("{} {} {}", status.name, status.run_id, status.phase)
}

/// Render the step-outcome table for one status document.
pub fn render_status(status: &Status) -> String {
    let mut out = String::new();
    out.push_str(&format!("run:      {}:{}\n", status.name, status.run_id));
    out.push_str(&format!("status:   {}\n", status.phase));
    if let Some(worker) = &status.worker_id {
        out.push_str(&format!("worker:   {worker}\n"));
    }
    if !status.params.is_empty() {
        out.push_str(&format!("params:   {}\n", status.params));
    }
    if let Some(started) = status.started_at {
        out.push_str(&format!("started:  {}\n", format_ts(started)));
    }
    if let Some(finished) = status.finished_at {
        out.push_str(&format!("finished: {}\n", format_ts(finished)));
    }
    if let Some(error) = &status.error {
        out.push_str(&format!("error:    {error}\n"));
    }

    let mut table = Table::new(vec![
        Column::left("STEP"),
        Column::left("STATUS"),
        Column::left("STARTED"),
        Column::left("FINISHED"),
        Column::left("ERROR").max_width(60),
    ]);
    for node in &status.nodes {
        table.row(node_row(node));
    }
    for handler in [
        &status.on_success,
        &status.on_failure,
        &status.on_cancel,
        &status.on_exit,
    ]
    .into_iter()
    .flatten()
    {
        table.row(node_row(handler));
    }
    if !table.is_empty() {
        out.push('\n');
        out.push_str(&table.render());
    }
    out
}

fn node_row(node: &Node) -> Vec<String> {
    vec![
        node.step.clone(),
        node.phase.to_string(),
        node.started_at.map(format_ts).unwrap_or_default(),
        node.finished_at.map(format_ts).unwrap_or_default(),
        node.error.clone().unwrap_or_default(),
    ]
}

/// Render the history listing.
pub fn render_history(statuses: &[Status]) -> String {
    let mut table = Table::new(vec![
        Column::left("NAME"),
        Column::left("RUN-ID").max_width(36),
        Column::left("STATUS"),
        Column::left("STARTED"),
        Column::left("FINISHED"),
    ]);
    for status in statuses {
        table.row(vec![
            status.name.clone(),
            status.run_id.as_str().to_string(),
            status.phase.to_string(),
            status.started_at.map(format_ts).unwrap_or_default(),
            status.finished_at.map(format_ts).unwrap_or_default(),
        ]);
    }
    table.render()
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%SZ").to_string()
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

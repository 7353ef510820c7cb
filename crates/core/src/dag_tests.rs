// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn two_step_dag() -> Dag {
    Dag::new(
        "etl",
        vec![
            Step::command("extract", vec!["true".into()]),
            Step {
                depends: vec!["extract".into()],
                ..Step::command("load", vec!["true".into()])
            },
        ],
    )
}

#[test]
fn proc_group_defaults_to_name() {
    let mut dag = two_step_dag();
    assert_eq!(dag.proc_group(), "etl");
    dag.proc_group = "shared-pool".into();
    assert_eq!(dag.proc_group(), "shared-pool");
}

#[test]
fn queue_defaults_to_name() {
    let mut dag = two_step_dag();
    assert_eq!(dag.queue_name(), "etl");
    dag.queue = "batch".into();
    assert_eq!(dag.queue_name(), "batch");
}

#[test]
fn steps_preserve_definition_order() {
    let dag = two_step_dag();
    let names: Vec<_> = dag.steps.keys().cloned().collect();
    assert_eq!(names, vec!["extract", "load"]);
}

#[test]
fn json_round_trip_preserves_structure() {
    let dag = two_step_dag();
    let json = serde_json::to_string(&dag).unwrap();
    let back: Dag = serde_json::from_str(&json).unwrap();
    assert_eq!(back, dag);
}

#[test]
fn defaults_are_omitted_from_json() {
    let dag = two_step_dag();
    let json = serde_json::to_string(&dag).unwrap();
    assert!(!json.contains("proc_group"));
    assert!(!json.contains("handlers"));
    assert!(!json.contains("log_dir"));
}

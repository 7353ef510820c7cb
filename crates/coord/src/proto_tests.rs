// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dagrun_core::Step;
use yare::parameterized;

fn task_with_labels(pairs: &[(&str, &str)]) -> Task {
    let mut task = Task::new(
        DagRunRef::new("etl", "r1"),
        Dag::new("etl", vec![Step::command("only", vec!["true".into()])]),
        "",
    );
    task.required_labels = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    task
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[parameterized(
    no_requirements_any_worker = { &[], &[("zone", "us")], true },
    exact_match = { &[("gpu", "a100")], &[("gpu", "a100")], true },
    extra_worker_labels_ok = { &[("gpu", "a100")], &[("gpu", "a100"), ("zone", "us")], true },
    value_mismatch = { &[("gpu", "a100")], &[("gpu", "h100")], false },
    missing_key = { &[("gpu", "a100")], &[("zone", "us")], false },
    all_keys_required = { &[("gpu", "a100"), ("zone", "eu")], &[("gpu", "a100")], false },
)]
fn label_matching(required: &[(&str, &str)], advertised: &[(&str, &str)], expected: bool) {
    let task = task_with_labels(required);
    assert_eq!(task.matches(&labels(advertised)), expected);
}

#[test]
fn task_ids_are_unique_and_sortable() {
    let a = task_with_labels(&[]);
    let b = task_with_labels(&[]);
    assert_ne!(a.task_id, b.task_id);
    assert!(a.task_id <= b.task_id);
}

#[test]
fn request_serde_round_trip() {
    let request = Request::Dispatch {
        task: task_with_labels(&[("os", "linux")]),
    };
    let json = serde_json::to_string(&request).unwrap();
    assert!(json.contains("\"op\":\"dispatch\""));
    let back: Request = serde_json::from_str(&json).unwrap();
    match back {
        Request::Dispatch { task } => assert_eq!(task.required_labels["os"], "linux"),
        other => panic!("unexpected request: {other:?}"),
    }
}

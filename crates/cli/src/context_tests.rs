// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dagrun_core::Step;
use serial_test::serial;

fn ctx_at(root: &Path) -> AppContext {
    std::env::set_var(dagrun_storage::paths::HOME_ENV, root);
    let (_tx, rx) = watch::channel(false);
    AppContext::load("default", true, rx).unwrap()
}

#[test]
#[serial]
fn default_config_when_file_missing() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    assert!(ctx.config.queues.enabled);
    assert_eq!(ctx.config.coordinator.port, 9101);
}

#[test]
#[serial]
fn config_file_overrides_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        r#"
            proc_stale_ttl_secs = 60
            shell = "bash"

            [queues]
            enabled = false

            [coordinator]
            port = 9200
            endpoints = ["c1:9200"]
        "#,
    )
    .unwrap();

    let ctx = ctx_at(tmp.path());
    assert_eq!(ctx.config.proc_stale_ttl_secs, Some(60));
    assert_eq!(ctx.config.shell.as_deref(), Some("bash"));
    assert!(!ctx.config.queues.enabled);
    assert_eq!(ctx.config.coordinator.port, 9200);
    assert_eq!(ctx.config.coordinator.endpoints, vec!["c1:9200"]);
}

#[test]
#[serial]
fn load_dag_by_name_and_by_path() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    let dag = Dag::new("etl", vec![Step::command("only", vec!["true".into()])]);

    std::fs::create_dir_all(ctx.dirs.dags_dir()).unwrap();
    let named = ctx.dirs.dags_dir().join("etl.json");
    std::fs::write(&named, serde_json::to_string(&dag).unwrap()).unwrap();

    assert_eq!(ctx.load_dag("etl").unwrap().name, "etl");
    assert_eq!(
        ctx.load_dag(named.to_str().unwrap()).unwrap().name,
        "etl"
    );
    assert!(ctx.load_dag("missing").is_err());
}

#[test]
#[serial]
fn agent_config_honors_log_dir_override() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx_at(tmp.path());
    let mut dag = Dag::new("etl", vec![Step::command("only", vec!["true".into()])]);

    let cfg = ctx.agent_config(&dag, "r1");
    assert!(cfg.log_dir.starts_with(ctx.dirs.logs_dir()));

    dag.log_dir = Some("/custom/logs".into());
    let cfg = ctx.agent_config(&dag, "r1");
    assert_eq!(cfg.log_dir, PathBuf::from("/custom/logs/r1"));
}

//! Shared fixtures for the CLI specs.

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// Namespace id of the default namespace (first 4 hex chars of
/// sha256("default")); every store path is partitioned by it.
pub const DEFAULT_NS: &str = "37a8";

/// One throwaway dagrun home.
pub struct Repo {
    pub tmp: TempDir,
}

impl Repo {
    pub fn new() -> Self {
        Self {
            tmp: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.tmp.path()
    }

    /// A `dagrun` invocation against this home.
    pub fn dagrun(&self) -> Command {
        let mut cmd = Command::cargo_bin("dagrun").unwrap();
        cmd.env("DAGRUN_HOME", self.root());
        cmd.env_remove("DEBUG");
        cmd.env_remove("DISABLE_DAG_RUN_QUEUE");
        cmd
    }

    /// Path to the built binary, for background invocations.
    pub fn bin() -> PathBuf {
        assert_cmd::cargo::cargo_bin("dagrun")
    }

    pub fn dags_dir(&self) -> PathBuf {
        self.root().join("dags").join(DEFAULT_NS)
    }

    pub fn dag_runs_dir(&self) -> PathBuf {
        self.root()
            .join("data/ns")
            .join(DEFAULT_NS)
            .join("dag-runs")
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.root().join("data/ns").join(DEFAULT_NS).join("queue")
    }

    /// Write a DAG definition into the dags dir.
    pub fn write_dag(&self, name: &str, dag: serde_json::Value) {
        std::fs::create_dir_all(self.dags_dir()).unwrap();
        std::fs::write(
            self.dags_dir().join(format!("{name}.json")),
            serde_json::to_string_pretty(&dag).unwrap(),
        )
        .unwrap();
    }

    /// A single-step DAG running one command.
    pub fn single_step(name: &str, argv: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "steps": {
                "only": { "name": "only", "command": argv }
            }
        })
    }

    /// Same, with `max_active_runs` set.
    pub fn single_step_bounded(name: &str, argv: &[&str], max_active_runs: u32) -> serde_json::Value {
        let mut dag = Self::single_step(name, argv);
        dag["max_active_runs"] = serde_json::json!(max_active_runs);
        dag
    }

    /// Run dirs recorded for `(dag, run_id)`, hidden excluded.
    pub fn attempt_dirs(&self, dag: &str, run_id: &str) -> Vec<String> {
        let dir = self.dag_runs_dir().join(dag);
        if !dir.is_dir() {
            return Vec::new();
        }
        let mut dirs: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_type().unwrap().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.') && n.ends_with(&format!("_{run_id}")))
            .collect();
        dirs.sort();
        dirs
    }

    /// Queue item file names for a queue, FIFO order.
    pub fn queue_items(&self, queue: &str) -> Vec<String> {
        let dir = self.queue_dir().join(queue);
        if !dir.is_dir() {
            return Vec::new();
        }
        let mut items: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".json"))
            .collect();
        items.sort();
        items
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared command context: resolved data root, configuration, stores.

use anyhow::{anyhow, Context as _};
use dagrun_coord::{CoordinatorEndpoints, RegistryEndpoints, StaticEndpoints, TlsConfig};
use dagrun_core::{Dag, Namespace, Phase, Status};
use dagrun_engine::{Admission, AgentConfig, LocalRunner, RunManager};
use dagrun_storage::{Attempt, DataDirs, ProcHandle, ProcStore, QueueStore, RunStore, ServiceRegistry};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// `config.toml` at the data root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TTL for orphan proc handles before they are purged.
    pub proc_stale_ttl_secs: Option<u64>,
    /// Default shell for step commands.
    pub shell: Option<String>,
    pub queues: QueuesConfig,
    pub coordinator: CoordinatorConfig,
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub enabled: bool,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    /// Static endpoint list for shared-nothing workers; empty = discover
    /// through the service registry.
    pub endpoints: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9101,
            endpoints: Vec::new(),
        }
    }
}

impl Config {
    fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Everything a command driver needs.
pub struct AppContext {
    pub dirs: DataDirs,
    pub config: Config,
    pub manager: RunManager,
    pub quiet: bool,
    pub cancel: watch::Receiver<bool>,
}

impl AppContext {
    pub fn load(
        namespace: &str,
        quiet: bool,
        cancel: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let dirs = DataDirs::resolve(Namespace::from_name(namespace));
        let config = Config::load(&dirs.config_path())?;

        let mut procs = ProcStore::new(dirs.proc_dir());
        if let Some(ttl) = config.proc_stale_ttl_secs {
            procs = procs.with_stale_ttl(Duration::from_secs(ttl));
        }
        let admission = Admission::new(
            RunStore::new(dirs.dag_runs_dir()),
            procs,
            QueueStore::new(dirs.queue_dir()),
        );

        Ok(Self {
            dirs,
            config,
            manager: RunManager::new(admission),
            quiet,
            cancel,
        })
    }

    /// Load a DAG definition by name (from the dags dir) or by path to a
    /// `dag.json` snapshot.
    pub fn load_dag(&self, name_or_path: &str) -> anyhow::Result<Dag> {
        let direct = PathBuf::from(name_or_path);
        let path = if direct.extension().and_then(|e| e.to_str()) == Some("json")
            && direct.is_file()
        {
            direct
        } else {
            let named = self
                .dirs
                .dags_dir()
                .join(format!("{}.json", dagrun_core::safe_name(name_or_path)));
            if !named.is_file() {
                return Err(anyhow!("no DAG named {name_or_path} in {}", self.dirs.dags_dir().display()));
            }
            named
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let dag: Dag =
            serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(dag)
    }

    /// Agent configuration for one run.
    pub fn agent_config(&self, dag: &Dag, run_id: &str) -> AgentConfig {
        let log_dir = match &dag.log_dir {
            Some(dir) => PathBuf::from(dir).join(run_id),
            None => self.dirs.run_log_dir(&dag.name, run_id),
        };
        AgentConfig {
            log_dir,
            shell: self.config.shell.clone(),
            step_filter: None,
        }
    }

    /// Execute an admitted attempt locally to its terminal phase.
    pub async fn run_local(
        &self,
        dag: &Dag,
        attempt: &Attempt,
        handle: ProcHandle,
        status: Status,
        cfg: AgentConfig,
    ) -> anyhow::Result<Phase> {
        let runner = LocalRunner::new(self.manager.admission().procs().clone());
        Ok(runner
            .run(dag, attempt, handle, status, cfg, self.cancel.clone())
            .await?)
    }

    pub fn registry(&self) -> ServiceRegistry {
        ServiceRegistry::new(self.dirs.services_dir())
    }

    /// Coordinator discovery: the static config list when present, else the
    /// file-based service registry.
    pub fn endpoint_source(&self, overrides: &[String]) -> Arc<dyn CoordinatorEndpoints> {
        if !overrides.is_empty() {
            Arc::new(StaticEndpoints::new(overrides.to_vec()))
        } else if !self.config.coordinator.endpoints.is_empty() {
            Arc::new(StaticEndpoints::new(
                self.config.coordinator.endpoints.clone(),
            ))
        } else {
            Arc::new(RegistryEndpoints::new(self.registry()))
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

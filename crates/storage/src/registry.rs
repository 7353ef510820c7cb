// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The service registry: advertised coordinator endpoints for worker
//! discovery.
//!
//! Each live coordinator owns one JSON file under the services directory,
//! rewritten (temp + rename) on every heartbeat. Readers prune entries whose
//! mtime exceeds the stale TTL, so a crashed coordinator disappears without
//! coordination.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, warn};

/// Default TTL after which an un-heartbeated advertisement is pruned.
pub const DEFAULT_AD_TTL: Duration = Duration::from_secs(90);

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One advertised coordinator endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorEndpoint {
    pub host: String,
    pub port: u16,
    pub pid: u32,
    pub hostname: String,
    pub started_at_ms: u64,
}

impl CoordinatorEndpoint {
    /// `host:port` address string for dialing.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Live advertisement guard: removes the file on drop.
pub struct ServiceAd {
    path: PathBuf,
    endpoint: CoordinatorEndpoint,
}

impl ServiceAd {
    /// Rewrite the advertisement, refreshing its mtime.
    pub fn heartbeat(&self) -> Result<(), RegistryError> {
        write_ad(&self.path, &self.endpoint)
    }

    pub fn endpoint(&self) -> &CoordinatorEndpoint {
        &self.endpoint
    }
}

impl Drop for ServiceAd {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to withdraw service ad");
            }
        }
    }
}

/// File-based coordinator discovery.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    dir: PathBuf,
    stale_ttl: Duration,
}

impl ServiceRegistry {
    pub fn new(services_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: services_dir.into().join("coordinator"),
            stale_ttl: DEFAULT_AD_TTL,
        }
    }

    pub fn with_stale_ttl(mut self, ttl: Duration) -> Self {
        self.stale_ttl = ttl;
        self
    }

    /// Advertise an endpoint under the given instance id.
    pub fn advertise(
        &self,
        instance_id: &str,
        endpoint: CoordinatorEndpoint,
    ) -> Result<ServiceAd, RegistryError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{}.json", dagrun_core::safe_name(instance_id)));
        write_ad(&path, &endpoint)?;
        debug!(instance = instance_id, addr = %endpoint.addr(), "advertised coordinator");
        Ok(ServiceAd { path, endpoint })
    }

    /// Endpoints with a fresh heartbeat, pruning stale files in place.
    pub fn list_alive(&self) -> Result<Vec<CoordinatorEndpoint>, RegistryError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut endpoints = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let mtime = entry.metadata()?.modified()?;
            let age = SystemTime::now()
                .duration_since(mtime)
                .unwrap_or(Duration::ZERO);
            if age > self.stale_ttl {
                warn!(path = %path.display(), "pruning stale coordinator ad");
                let _ = std::fs::remove_file(&path);
                continue;
            }
            match std::fs::read_to_string(&path)
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok())
            {
                Some(endpoint) => endpoints.push(endpoint),
                None => {
                    warn!(path = %path.display(), "pruning unreadable coordinator ad");
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
        endpoints.sort_by_key(|e: &CoordinatorEndpoint| e.started_at_ms);
        Ok(endpoints)
    }
}

fn write_ad(path: &PathBuf, endpoint: &CoordinatorEndpoint) -> Result<(), RegistryError> {
    let tmp = path.with_extension("tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        serde_json::to_writer(&file, endpoint)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

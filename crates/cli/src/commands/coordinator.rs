// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagrun coordinator`: host the task broker.

use crate::context::AppContext;
use clap::Args;
use dagrun_coord::{Broker, CoordinatorServer, TlsConfig};
use dagrun_storage::{proc, CoordinatorEndpoint};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Interval between service-registry heartbeats.
const AD_HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Args)]
pub struct CoordinatorArgs {
    /// Bind host (config default when omitted)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (config default when omitted)
    #[arg(long)]
    pub port: Option<u16>,

    /// TLS certificate file
    #[arg(long = "cert-file")]
    pub cert_file: Option<PathBuf>,

    /// TLS private key file
    #[arg(long = "key-file")]
    pub key_file: Option<PathBuf>,

    /// CA bundle for mutual TLS
    #[arg(long = "ca-file")]
    pub ca_file: Option<PathBuf>,

    /// Do not advertise in the service registry
    #[arg(long = "no-registry")]
    pub no_registry: bool,
}

pub async fn run(ctx: &AppContext, args: CoordinatorArgs) -> anyhow::Result<ExitCode> {
    let host = args
        .host
        .unwrap_or_else(|| ctx.config.coordinator.host.clone());
    let port = args.port.unwrap_or(ctx.config.coordinator.port);

    let tls = TlsConfig {
        cert_file: args.cert_file.or_else(|| ctx.config.tls.cert_file.clone()),
        key_file: args.key_file.or_else(|| ctx.config.tls.key_file.clone()),
        ca_file: args.ca_file.or_else(|| ctx.config.tls.ca_file.clone()),
        skip_tls_verify: ctx.config.tls.skip_tls_verify,
    };

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "coordinator starting");

    // Advertise for dynamic worker discovery
    let instance_id = format!("{}@{}", proc::hostname(), std::process::id());
    let ad = if args.no_registry {
        None
    } else {
        Some(ctx.registry().advertise(
            &instance_id,
            CoordinatorEndpoint {
                host: host.clone(),
                port: local.port(),
                pid: std::process::id(),
                hostname: proc::hostname(),
                started_at_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
            },
        )?)
    };

    let heartbeat = ad.map(|ad| {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AD_HEARTBEAT);
            loop {
                ticker.tick().await;
                if let Err(e) = ad.heartbeat() {
                    warn!(error = %e, "registry heartbeat failed");
                }
            }
        })
    });

    let server = CoordinatorServer::new(Broker::default(), &tls)?;
    server.serve(listener, ctx.cancel.clone()).await?;

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    info!("coordinator stopped");
    Ok(ExitCode::SUCCESS)
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dagrun - DAG-run orchestrator CLI
//!
//! Every verb is a thin driver over the engine's admission controller and
//! run manager; the long-lived verbs (`coordinator`, `worker`) host the
//! broker and the poll loop.

mod commands;
mod context;
mod output;
mod table;

use clap::{Parser, Subcommand};
use commands::{
    cleanup, coordinator, dequeue, enqueue, exec, history, migrate, restart, retry, start, status,
    stop, worker,
};
use context::AppContext;
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "dagrun",
    version,
    about = "dagrun - DAG-run orchestration: dispatch, execute, and track job graphs"
)]
struct Cli {
    /// Suppress normal output; errors still set the exit code
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Namespace to operate in
    #[arg(long, global = true, default_value = "default", value_name = "NAME")]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a DAG run
    Start(start::StartArgs),
    /// Stop a run, then start a fresh one with the same params
    Restart(restart::RestartArgs),
    /// Re-execute a finished run under the same run ID
    Retry(retry::RetryArgs),
    /// Run a one-off command as an anonymous DAG
    Exec(exec::ExecArgs),
    /// Request a cooperative stop of a running DAG run
    Stop(stop::StopArgs),
    /// Show the current status of a DAG run
    Status(status::StatusArgs),
    /// List recorded DAG runs with filters
    History(history::HistoryArgs),
    /// Put a run on its queue without executing it
    Enqueue(enqueue::EnqueueArgs),
    /// Remove a run from a queue
    Dequeue(dequeue::DequeueArgs),
    /// Remove old run records past the retention window
    Cleanup(cleanup::CleanupArgs),
    /// Layout migrations
    Migrate(migrate::MigrateArgs),
    /// Run the coordinator service
    Coordinator(coordinator::CoordinatorArgs),
    /// Run a worker agent
    Worker(worker::WorkerArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cancel = spawn_signal_listener();
    let ctx = match AppContext::load(&cli.namespace, cli.quiet, cancel) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("dagrun: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Service verbs log to a rotated file under logs/admin; one-shot verbs
    // log to stderr
    let service_log = match &cli.command {
        Commands::Coordinator(_) => Some(ctx.dirs.root().join("logs/admin/coordinator.log")),
        Commands::Worker(_) => Some(ctx.dirs.root().join("logs/admin/worker.log")),
        _ => None,
    };
    let _log_guard = init_logging(cli.quiet, service_log);

    let result = match cli.command {
        Commands::Start(args) => start::run(&ctx, args).await,
        Commands::Restart(args) => restart::run(&ctx, args).await,
        Commands::Retry(args) => retry::run(&ctx, args).await,
        Commands::Exec(args) => exec::run(&ctx, args).await,
        Commands::Stop(args) => stop::run(&ctx, args).await,
        Commands::Status(args) => status::run(&ctx, args).await,
        Commands::History(args) => history::run(&ctx, args).await,
        Commands::Enqueue(args) => enqueue::run(&ctx, args).await,
        Commands::Dequeue(args) => dequeue::run(&ctx, args).await,
        Commands::Cleanup(args) => cleanup::run(&ctx, args).await,
        Commands::Migrate(args) => migrate::run(&ctx, args).await,
        Commands::Coordinator(args) => coordinator::run(&ctx, args).await,
        Commands::Worker(args) => worker::run(&ctx, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            if !cli.quiet {
                eprintln!("dagrun: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Maximum service log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated service logs to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Logging setup; `DEBUG=1` forces debug level. Service verbs write through
/// a non-blocking file appender (guard must stay alive), one-shot verbs go
/// to stderr.
fn init_logging(
    quiet: bool,
    service_log: Option<std::path::PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let debug_forced = std::env::var("DEBUG").map_or(false, |v| v == "1");
    let default = if debug_forced {
        "debug"
    } else if service_log.is_some() {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match service_log {
        Some(path) => {
            rotate_log_if_needed(&path);
            let (dir, file_name) = match (path.parent(), path.file_name()) {
                (Some(dir), Some(file_name)) => (dir.to_owned(), file_name.to_owned()),
                _ => return None,
            };
            let _ = std::fs::create_dir_all(&dir);
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .init();
            None
        }
    }
}

/// Shift `x.log` → `x.log.1` → … once the file passes [`MAX_LOG_SIZE`].
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// SIGINT/SIGTERM cancel the root token; every long-running loop observes it.
fn spawn_signal_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "no SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "no SIGINT handler");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => debug!("received SIGTERM"),
            _ = sigint.recv() => debug!("received SIGINT"),
        }
        let _ = tx.send(true);
    });
    rx
}

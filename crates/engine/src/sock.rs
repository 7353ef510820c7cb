// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run control socket.
//!
//! The agent owning a run serves a UNIX-domain socket next to its proc
//! handle. One exchange per connection, newline-delimited JSON: the client
//! writes a request line, reads a response line, and closes. The manager
//! prefers this live channel for current status and cooperative stop,
//! falling back to the status log tail when nobody answers.

use dagrun_core::Status;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Errors from control-socket exchanges
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed before response")]
    Closed,
}

/// Requests a client may send.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Stop,
}

/// Responses from the owning agent.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlResponse {
    Status { status: Status },
    Stopping,
}

/// The agent-side server for one run.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    current: Arc<Mutex<Status>>,
    stop_tx: watch::Sender<bool>,
}

impl ControlServer {
    /// Bind the per-run socket, replacing any stale file at the path.
    pub fn bind(
        path: &Path,
        initial: Status,
        stop_tx: watch::Sender<bool>,
    ) -> Result<Self, ControlError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(path)?;
        Ok(Self {
            listener,
            path: path.to_owned(),
            current: Arc::new(Mutex::new(initial)),
            stop_tx,
        })
    }

    /// Shared cell the agent updates on every status transition.
    pub fn status_cell(&self) -> Arc<Mutex<Status>> {
        Arc::clone(&self.current)
    }

    /// Serve until cancelled. Each connection is one request/response pair.
    pub async fn serve(self, mut cancel: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let current = Arc::clone(&self.current);
                            let stop_tx = self.stop_tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, current, stop_tx).await {
                                    debug!(error = %e, "control connection failed");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "control accept failed");
                            break;
                        }
                    }
                }
                _ = cancel.changed() => break,
            }
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove control socket");
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    current: Arc<Mutex<Status>>,
    stop_tx: watch::Sender<bool>,
) -> Result<(), ControlError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let Some(line) = lines.next_line().await? else {
        return Err(ControlError::Closed);
    };
    let request: ControlRequest = serde_json::from_str(&line)?;

    let response = match request {
        ControlRequest::Status => ControlResponse::Status {
            status: current.lock().clone(),
        },
        ControlRequest::Stop => {
            // Cooperative: the agent observes the flag at its next
            // suspension point
            let _ = stop_tx.send(true);
            ControlResponse::Stopping
        }
    };

    let mut payload = serde_json::to_vec(&response)?;
    payload.push(b'\n');
    write_half.write_all(&payload).await?;
    write_half.flush().await?;
    Ok(())
}

async fn exchange(path: &Path, request: &ControlRequest) -> Result<ControlResponse, ControlError> {
    let stream = UnixStream::connect(path).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    write_half.write_all(&payload).await?;
    write_half.flush().await?;

    let mut lines = BufReader::new(read_half).lines();
    let Some(line) = lines.next_line().await? else {
        return Err(ControlError::Closed);
    };
    Ok(serde_json::from_str(&line)?)
}

/// Ask the owning agent for the live status.
pub async fn query_status(path: &Path) -> Result<Status, ControlError> {
    match exchange(path, &ControlRequest::Status).await? {
        ControlResponse::Status { status } => Ok(status),
        ControlResponse::Stopping => Err(ControlError::Closed),
    }
}

/// Request a cooperative stop. Idempotent.
pub async fn send_stop(path: &Path) -> Result<(), ControlError> {
    match exchange(path, &ControlRequest::Stop).await? {
        ControlResponse::Stopping => Ok(()),
        ControlResponse::Status { .. } => Ok(()),
    }
}

#[cfg(test)]
#[path = "sock_tests.rs"]
mod tests;

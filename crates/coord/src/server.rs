// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The coordinator server: a TCP accept loop over the framed codec, with
//! optional TLS termination.

use crate::broker::Broker;
use crate::proto::{Request, Response};
use crate::tls::TlsConfig;
use crate::wire::{self, WireError, DEFAULT_TIMEOUT};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Cap on one long poll, however large the client's ask.
const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval of the requeue/TTL sweep.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from running the coordinator server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] crate::tls::TlsError),
}

/// The coordinator service.
pub struct CoordinatorServer {
    broker: Broker,
    tls: Option<TlsAcceptor>,
}

impl CoordinatorServer {
    pub fn new(broker: Broker, tls: &TlsConfig) -> Result<Self, ServerError> {
        Ok(Self {
            broker,
            tls: tls.acceptor()?,
        })
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Accept connections until cancelled.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        info!(addr = ?listener.local_addr().ok(), tls = self.tls.is_some(), "coordinator listening");

        // Requeue/TTL sweep
        let tick_broker = self.broker.clone();
        let mut tick_cancel = cancel.clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick_broker.tick(std::time::Instant::now()),
                    _ = tick_cancel.changed() => break,
                }
            }
        });

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    debug!(%peer, "connection accepted");
                    let broker = self.broker.clone();
                    let tls = self.tls.clone();
                    let conn_cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, tls, broker, conn_cancel).await {
                            debug!(%peer, error = %e, "connection ended");
                        }
                    });
                }
                _ = cancel.changed() => break,
            }
        }

        sweeper.abort();
        info!("coordinator stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
    broker: Broker,
    cancel: watch::Receiver<bool>,
) -> Result<(), WireError> {
    match tls {
        Some(acceptor) => {
            let stream = acceptor.accept(stream).await?;
            handle_requests(stream, broker, cancel).await
        }
        None => handle_requests(stream, broker, cancel).await,
    }
}

/// One framed request/response at a time until the peer hangs up.
async fn handle_requests<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    broker: Broker,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), WireError> {
    loop {
        let bytes = tokio::select! {
            read = wire::read_message(&mut stream) => match read {
                Ok(bytes) => bytes,
                Err(WireError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            },
            _ = cancel.changed() => return Ok(()),
        };

        let response = match wire::decode::<Request>(&bytes) {
            Ok(request) => handle_request(&broker, request, &mut cancel).await,
            Err(e) => Response::Error {
                message: format!("bad request: {e}"),
            },
        };

        wire::write_with_timeout(&mut stream, &response, DEFAULT_TIMEOUT).await?;
    }
}

async fn handle_request(
    broker: &Broker,
    request: Request,
    cancel: &mut watch::Receiver<bool>,
) -> Response {
    match request {
        Request::Poll {
            worker_id,
            poller_id,
            labels,
            timeout_secs,
        } => {
            let timeout = Duration::from_secs(timeout_secs).min(MAX_POLL_TIMEOUT);
            tokio::select! {
                polled = broker.poll(&worker_id, &poller_id, labels, timeout) => match polled {
                    Some(task) => Response::Task { task },
                    None => Response::Empty,
                },
                // Cancellation drains long polls as empty
                _ = cancel.changed() => Response::Empty,
            }
        }
        Request::Dispatch { task } => {
            let task_id = task.task_id.clone();
            broker.dispatch(task);
            Response::Dispatched { task_id }
        }
        Request::Ack { task_id, worker_id } => {
            if broker.ack(&task_id, &worker_id) {
                Response::Ok
            } else {
                Response::Error {
                    message: format!("unknown or unclaimable task: {task_id}"),
                }
            }
        }
        Request::Report { update } => {
            if broker.report(update) {
                Response::Ok
            } else {
                Response::Error {
                    message: "unknown task".to_string(),
                }
            }
        }
        Request::GetTask { task_id } => match broker.task_state(&task_id) {
            Some(state) => Response::TaskState { state },
            None => Response::Error {
                message: format!("unknown task: {task_id}"),
            },
        },
        Request::Heartbeat => Response::Ok,
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

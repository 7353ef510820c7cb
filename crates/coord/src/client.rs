// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the coordinator: used by workers (poll/ack/report) and by
//! dispatching agents (dispatch/get-task).
//!
//! Every exchange dials a fresh connection to the first reachable endpoint
//! from the discovery source. Transient failures back off exponentially
//! (250 ms doubling to 30 s) before the next attempt.

use crate::endpoints::CoordinatorEndpoints;
use crate::proto::{Request, Response, StatusUpdate, Task, TaskState};
use crate::tls::{server_name, TlsConfig, TlsError};
use crate::wire::{self, WireError, DEFAULT_TIMEOUT};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// First retry delay.
pub const BACKOFF_INITIAL: Duration = Duration::from_millis(250);

/// Retry delay cap.
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Errors from coordinator exchanges
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("no coordinator endpoints available")]
    NoEndpoints,
    #[error("coordinator unreachable: {0}")]
    Unreachable(String),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
    #[error("coordinator error: {0}")]
    Remote(String),
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

impl CoordError {
    /// Transient errors are worth a backoff-retry; remote refusals are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoordError::NoEndpoints | CoordError::Unreachable(_) | CoordError::Wire(_)
        )
    }
}

/// Coordinator client over an endpoint source.
#[derive(Clone)]
pub struct CoordinatorClient {
    endpoints: Arc<dyn CoordinatorEndpoints>,
    tls: Option<TlsConnector>,
    tls_server_name: Option<String>,
}

impl CoordinatorClient {
    pub fn new(
        endpoints: Arc<dyn CoordinatorEndpoints>,
        tls: &TlsConfig,
    ) -> Result<Self, CoordError> {
        Ok(Self {
            endpoints,
            tls: tls.connector()?,
            tls_server_name: None,
        })
    }

    /// Override the SNI name (defaults to the endpoint host).
    pub fn with_tls_server_name(mut self, name: impl Into<String>) -> Self {
        self.tls_server_name = Some(name.into());
        self
    }

    /// One request against the first endpoint that answers.
    pub async fn request(&self, request: &Request, read_timeout: Duration) -> Result<Response, CoordError> {
        let addrs = self.endpoints.endpoints();
        if addrs.is_empty() {
            return Err(CoordError::NoEndpoints);
        }

        let mut last_err = None;
        for addr in &addrs {
            match self.request_addr(addr, request, read_timeout).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!(addr = %addr, error = %e, "endpoint failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(CoordError::NoEndpoints))
    }

    async fn request_addr(
        &self,
        addr: &str,
        request: &Request,
        read_timeout: Duration,
    ) -> Result<Response, CoordError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| CoordError::Unreachable(format!("{addr}: {e}")))?;

        match &self.tls {
            Some(connector) => {
                let host = self
                    .tls_server_name
                    .clone()
                    .unwrap_or_else(|| addr.split(':').next().unwrap_or(addr).to_string());
                let stream = connector
                    .connect(server_name(&host)?, stream)
                    .await
                    .map_err(|e| CoordError::Unreachable(format!("{addr}: TLS: {e}")))?;
                exchange(stream, request, read_timeout).await
            }
            None => exchange(stream, request, read_timeout).await,
        }
    }

    /// Long-poll for a task. `Ok(None)` = empty poll.
    pub async fn poll(
        &self,
        worker_id: &str,
        poller_id: &str,
        labels: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Option<Task>, CoordError> {
        let request = Request::Poll {
            worker_id: worker_id.to_string(),
            poller_id: poller_id.to_string(),
            labels: labels.clone(),
            timeout_secs: timeout.as_secs(),
        };
        // Allow the server the full poll window plus slack
        match self.request(&request, timeout + DEFAULT_TIMEOUT).await? {
            Response::Task { task } => Ok(Some(task)),
            Response::Empty => Ok(None),
            Response::Error { message } => Err(CoordError::Remote(message)),
            _ => Err(CoordError::UnexpectedResponse("poll")),
        }
    }

    /// Submit a task for remote execution.
    pub async fn dispatch(&self, task: Task) -> Result<String, CoordError> {
        match self
            .request(&Request::Dispatch { task }, DEFAULT_TIMEOUT)
            .await?
        {
            Response::Dispatched { task_id } => Ok(task_id),
            Response::Error { message } => Err(CoordError::Remote(message)),
            _ => Err(CoordError::UnexpectedResponse("dispatch")),
        }
    }

    pub async fn ack(&self, task_id: &str, worker_id: &str) -> Result<(), CoordError> {
        match self
            .request(
                &Request::Ack {
                    task_id: task_id.to_string(),
                    worker_id: worker_id.to_string(),
                },
                DEFAULT_TIMEOUT,
            )
            .await?
        {
            Response::Ok => Ok(()),
            Response::Error { message } => Err(CoordError::Remote(message)),
            _ => Err(CoordError::UnexpectedResponse("ack")),
        }
    }

    pub async fn report(&self, update: StatusUpdate) -> Result<(), CoordError> {
        match self
            .request(&Request::Report { update }, DEFAULT_TIMEOUT)
            .await?
        {
            Response::Ok => Ok(()),
            Response::Error { message } => Err(CoordError::Remote(message)),
            _ => Err(CoordError::UnexpectedResponse("report")),
        }
    }

    pub async fn get_task(&self, task_id: &str) -> Result<TaskState, CoordError> {
        match self
            .request(
                &Request::GetTask {
                    task_id: task_id.to_string(),
                },
                DEFAULT_TIMEOUT,
            )
            .await?
        {
            Response::TaskState { state } => Ok(state),
            Response::Error { message } => Err(CoordError::Remote(message)),
            _ => Err(CoordError::UnexpectedResponse("get_task")),
        }
    }
}

async fn exchange<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    request: &Request,
    read_timeout: Duration,
) -> Result<Response, CoordError> {
    wire::write_with_timeout(&mut stream, request, DEFAULT_TIMEOUT).await?;
    Ok(wire::read_with_timeout(&mut stream, read_timeout).await?)
}

/// Capped exponential backoff sequence: 250 ms, 500 ms, … 30 s.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            next: BACKOFF_INITIAL,
        }
    }
}

impl Backoff {
    /// The delay to sleep before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(BACKOFF_CAP);
        delay
    }

    /// Reset after a successful exchange.
    pub fn reset(&mut self) {
        self.next = BACKOFF_INITIAL;
    }
}

impl CoordinatorClient {
    /// Retry a request with capped exponential backoff while the failure is
    /// transient. Long polls pass their own per-request timeout.
    pub async fn request_with_backoff(
        &self,
        request: &Request,
        read_timeout: Duration,
        max_attempts: usize,
    ) -> Result<Response, CoordError> {
        let mut backoff = Backoff::default();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request(request, read_timeout).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "retrying coordinator request");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Single-flight refresh coordination.
//!
//! Any number of callers may observe an expired token concurrently; the
//! coordinator guarantees exactly one refresh request is in flight at a
//! time. Callers arriving while a flight is running join an ordered
//! waiter queue and all receive the same outcome. A fatal outcome
//! force-logs-out the store before the waiters are resolved, so no
//! waiter ever replays against a session the store still believes is
//! live.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::Url;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::api::RefreshResponse;
use crate::config::SessionConfig;
use crate::error::{ApiError, ErrorBody};
use crate::http::{cookie_value, CSRF_HEADER, REFRESH_ENDPOINT};
use crate::store::SessionStore;

/// Why a refresh flight failed.
#[derive(Debug, Clone)]
pub enum RefreshError {
    /// The server rejected the refresh cookie (revoked, expired, or
    /// missing). Not retryable; the session is over.
    Rejected(String),
    /// Network or server fault. Retried with backoff before becoming
    /// fatal.
    Transport(String),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "refresh rejected: {msg}"),
            Self::Transport(msg) => write!(f, "refresh transport failure: {msg}"),
        }
    }
}

impl std::error::Error for RefreshError {}

struct Flight {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<Result<String, RefreshError>>>,
}

/// Coordinates refresh flights against one [`SessionStore`].
pub struct RefreshCoordinator {
    config: SessionConfig,
    store: Arc<SessionStore>,
    http: reqwest::Client,
    jar: Arc<Jar>,
    flight: Mutex<Flight>,
}

impl RefreshCoordinator {
    pub fn new(
        config: SessionConfig,
        store: Arc<SessionStore>,
        http: reqwest::Client,
        jar: Arc<Jar>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            http,
            jar,
            flight: Mutex::new(Flight {
                refreshing: false,
                waiters: Vec::new(),
            }),
        })
    }

    /// Refresh the access token, or join the flight already running.
    ///
    /// Returns the new access token on success. On failure the store has
    /// already been reset to logged-out.
    ///
    /// The flight itself runs as a detached task and every caller,
    /// including the one that started it, waits on the queue. A caller
    /// whose future is dropped mid-wait cannot strand the flight.
    pub async fn ensure_refresh(self: &Arc<Self>) -> Result<String, RefreshError> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut flight = self.flight.lock().await;
            flight.waiters.push(tx);
            if flight.refreshing {
                false
            } else {
                flight.refreshing = true;
                true
            }
        };

        if start {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = coordinator.run_flight().await;
                // Resolve the queue and clear the flight under one lock
                // so a new flight can only start after every waiter is
                // settled.
                let waiters = {
                    let mut flight = coordinator.flight.lock().await;
                    flight.refreshing = false;
                    std::mem::take(&mut flight.waiters)
                };
                for tx in waiters {
                    let _ = tx.send(outcome.clone());
                }
            });
        } else {
            debug!("joining in-flight refresh");
        }

        rx.await.unwrap_or_else(|_| {
            Err(RefreshError::Transport("refresh flight dropped".into()))
        })
    }

    async fn run_flight(&self) -> Result<String, RefreshError> {
        match self.refresh_with_retries().await {
            Ok(resp) => {
                debug!("refresh flight succeeded");
                self.store
                    .set_tokens(Some(resp.access_token.clone()), resp.csrf_token)
                    .await;
                Ok(resp.access_token)
            }
            Err(err) => {
                warn!(error = %err, "refresh flight failed, logging out");
                self.store.refresh_failed(err.to_string()).await;
                Err(err)
            }
        }
    }

    /// One refresh call, retrying transport faults with exponential
    /// backoff up to the configured cap. Rejections are never retried.
    async fn refresh_with_retries(&self) -> Result<RefreshResponse, RefreshError> {
        let mut delay = Duration::from_millis(250);
        let mut attempt = 0u32;
        loop {
            match self.refresh_once().await {
                Ok(resp) => return Ok(resp),
                Err(err @ RefreshError::Rejected(_)) => return Err(err),
                Err(err @ RefreshError::Transport(_)) => {
                    if attempt >= self.config.refresh_max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    debug!(attempt, ?delay, "refresh transport fault, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn refresh_once(&self) -> Result<RefreshResponse, RefreshError> {
        let url = format!("{}{}", self.config.base_url, REFRESH_ENDPOINT);
        let mut req = self.http.post(&url);
        if let Some(csrf) = self.csrf_token().await {
            req = req.header(CSRF_HEADER, csrf);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RefreshError::Transport(format!("request failed: {e}")))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| RefreshError::Transport(format!("decode refresh body: {e}")));
        }
        if status.is_server_error() {
            return Err(RefreshError::Transport(format!("HTTP {status}")));
        }
        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        Err(RefreshError::Rejected(
            parsed.extract_message(&format!("HTTP {status}")),
        ))
    }

    async fn csrf_token(&self) -> Option<String> {
        if let Some(csrf) = self.store.csrf_token().await {
            return Some(csrf);
        }
        let base = Url::parse(&self.config.base_url).ok()?;
        cookie_value(self.jar.as_ref(), &base, &self.config.csrf_cookie_name)
    }
}

// ApiError conversion used when a refresh failure has to surface
// through an API call result.
impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        ApiError::Auth {
            status: 401,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;

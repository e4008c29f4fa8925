// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Proactive refresh scheduling.
//!
//! Whenever a token lands in the store, a timer is armed for its expiry
//! minus a safety margin, so the refresh happens before any request can
//! hit an expired-401. Only the most recently armed timer survives;
//! arming cancels whatever was pending. Tokens without a decodable
//! expiry are simply not scheduled, and the reactive 401 path covers
//! them.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::events::SessionEvent;
use crate::refresh::RefreshCoordinator;
use crate::token;

/// Arms one pre-expiry refresh timer per token.
pub struct RefreshScheduler {
    config: SessionConfig,
    coordinator: Arc<RefreshCoordinator>,
    pending: Mutex<Option<CancellationToken>>,
}

impl RefreshScheduler {
    pub fn new(config: SessionConfig, coordinator: Arc<RefreshCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            config,
            coordinator,
            pending: Mutex::new(None),
        })
    }

    /// React to session events until the store is dropped.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(SessionEvent::TokensSet {
                    access_token: Some(tok),
                }) => self.reschedule(&tok).await,
                Ok(SessionEvent::TokensSet { access_token: None })
                | Ok(SessionEvent::LoggedOut) => self.cancel().await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "scheduler lagged behind session events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Cancel any pending timer and arm one for the given token.
    pub async fn reschedule(self: &Arc<Self>, access_token: &str) {
        let token = CancellationToken::new();
        {
            let mut pending = self.pending.lock().await;
            if let Some(old) = pending.replace(token.clone()) {
                old.cancel();
            }
        }

        let Some(exp) = token::expires_at(access_token) else {
            debug!("token has no decodable expiry, not scheduling");
            return;
        };
        let delay = refresh_delay(exp, self.config.refresh_margin());
        debug!(?delay, "proactive refresh armed");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    debug!("proactive refresh firing");
                    if let Err(err) = this.coordinator.ensure_refresh().await {
                        warn!(error = %err, "proactive refresh failed");
                    }
                }
            }
        });
    }

    /// Cancel the pending timer, if any.
    pub async fn cancel(&self) {
        if let Some(token) = self.pending.lock().await.take() {
            token.cancel();
        }
    }
}

/// Time until `exp` minus the margin; zero (fire immediately) when the
/// token is already inside the margin or past expiry.
fn refresh_delay(exp: u64, margin: Duration) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Duration::from_secs(exp.saturating_sub(now)).saturating_sub(margin)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

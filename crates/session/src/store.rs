// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! In-memory session store: the single source of truth for tokens, the
//! user snapshot, and derived status.
//!
//! The access token deliberately lives only in process memory (no
//! durable persistence), limiting exposure to script injection. All
//! mutation goes through explicit transition methods that each emit a
//! [`SessionEvent`]; collaborators never read-modify-write the state
//! themselves.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::api::AuthUser;
use crate::events::SessionEvent;

/// Derived session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Loading,
    Authenticated,
    Unauthenticated,
    Error,
}

/// Snapshot of the current session.
///
/// Invariant: `status == Authenticated` iff `access_token` is present.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: Option<String>,
    pub csrf_token: Option<String>,
    pub user: Option<AuthUser>,
    pub status: SessionStatus,
    pub error: Option<String>,
    /// Milliseconds since the Unix epoch of the last token issue.
    pub last_refresh_at: Option<u64>,
    pub loading: bool,
}

impl Session {
    fn initial() -> Self {
        Self {
            access_token: None,
            csrf_token: None,
            user: None,
            status: SessionStatus::Idle,
            error: None,
            last_refresh_at: None,
            loading: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

/// Shared, event-emitting session state container.
///
/// Injected by reference into the HTTP client, the refresh coordinator,
/// and the scheduler, so each can be tested against its own store.
pub struct SessionStore {
    inner: RwLock<Session>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new() -> (Arc<Self>, broadcast::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = broadcast::channel(64);
        let store = Arc::new(Self {
            inner: RwLock::new(Session::initial()),
            event_tx,
        });
        (store, event_rx)
    }

    /// Subscribe to session transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.access_token.clone()
    }

    pub async fn csrf_token(&self) -> Option<String> {
        self.inner.read().await.csrf_token.clone()
    }

    pub async fn set_loading(&self, loading: bool) {
        self.inner.write().await.loading = loading;
    }

    /// Install new tokens (login, register, Google auth, refresh).
    ///
    /// Passing `None` for the access token drops to unauthenticated.
    /// A `None` CSRF token keeps the existing one, matching the backend
    /// contract where refresh may omit a rotated CSRF value.
    pub async fn set_tokens(&self, access_token: Option<String>, csrf_token: Option<String>) {
        {
            let mut s = self.inner.write().await;
            s.last_refresh_at = access_token.as_ref().map(|_| epoch_ms());
            s.access_token = access_token.clone();
            if csrf_token.is_some() {
                s.csrf_token = csrf_token;
            }
            s.error = None;
            s.status = if s.access_token.is_some() {
                SessionStatus::Authenticated
            } else {
                SessionStatus::Unauthenticated
            };
        }
        let _ = self.event_tx.send(SessionEvent::TokensSet { access_token });
    }

    /// Replace the user snapshot wholesale.
    pub async fn set_user(&self, user: Option<AuthUser>) {
        let authenticated = {
            let mut s = self.inner.write().await;
            s.user = user;
            // Status stays keyed to the token, not the snapshot.
            if s.access_token.is_none() && s.status == SessionStatus::Authenticated {
                s.status = SessionStatus::Unauthenticated;
            }
            s.status == SessionStatus::Authenticated
        };
        let _ = self.event_tx.send(SessionEvent::UserSet { authenticated });
    }

    /// Flip the email-verified flag if the given email matches the
    /// current user (explicit flag update, not a snapshot replacement).
    pub async fn mark_email_verified(&self, email: &str) -> bool {
        let mut s = self.inner.write().await;
        match &mut s.user {
            Some(user) if user.email == email => {
                user.email_verified = Some(true);
                true
            }
            _ => false,
        }
    }

    /// Clear Google linkage fields on the current user after an unlink.
    pub async fn clear_google_linkage(&self) {
        let mut s = self.inner.write().await;
        if let Some(user) = &mut s.user {
            user.google_sub = None;
            if user.registered_via.as_deref() == Some("google") {
                user.provider = Some("email".to_owned());
            }
            user.provider_data = None;
            user.last_google_login_at = None;
        }
    }

    /// Record a user-visible failure without touching the tokens.
    pub async fn set_error(&self, message: impl Into<String>) {
        let mut s = self.inner.write().await;
        s.error = Some(message.into());
        s.status = SessionStatus::Error;
    }

    /// Failed login/register: unauthenticated with a message.
    pub async fn auth_failed(&self, message: impl Into<String>) {
        let mut s = self.inner.write().await;
        s.error = Some(message.into());
        s.loading = false;
        s.status = SessionStatus::Unauthenticated;
    }

    /// Hydration failure: drop the token, keep a message, no event storm.
    pub async fn set_unauthenticated(&self, message: Option<String>) {
        {
            let mut s = self.inner.write().await;
            s.access_token = None;
            s.last_refresh_at = None;
            s.error = message;
            s.status = SessionStatus::Unauthenticated;
        }
        let _ = self
            .event_tx
            .send(SessionEvent::TokensSet { access_token: None });
    }

    /// Reset to the initial state (logout).
    pub async fn reset(&self) {
        {
            let mut s = self.inner.write().await;
            *s = Session::initial();
            s.status = SessionStatus::Unauthenticated;
        }
        debug!("session reset to logged-out state");
        let _ = self.event_tx.send(SessionEvent::LoggedOut);
    }

    /// Fatal refresh failure: local logout plus a failure event. The
    /// server already rejected the refresh, so no logout call is made.
    pub async fn refresh_failed(&self, error: impl Into<String>) {
        let error = error.into();
        {
            let mut s = self.inner.write().await;
            *s = Session::initial();
            s.status = SessionStatus::Unauthenticated;
            s.error = Some(error.clone());
        }
        let _ = self.event_tx.send(SessionEvent::RefreshFailed { error });
        let _ = self.event_tx.send(SessionEvent::LoggedOut);
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

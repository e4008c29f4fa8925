// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Session and account-linking client for the Quayside marketplace.
//!
//! Core pieces:
//! - [`store::SessionStore`]: in-memory tokens + user snapshot, the
//!   single source of truth, broadcasting [`events::SessionEvent`]s.
//! - [`http::ApiClient`]: bearer/CSRF injection and the
//!   refresh-and-replay-once handling of expired-token 401s.
//! - [`refresh::RefreshCoordinator`]: single-flight refresh with an
//!   ordered waiter queue.
//! - [`scheduler::RefreshScheduler`]: pre-expiry refresh timers keyed
//!   off the token's `exp` claim.
//! - [`linking::LinkFlow`]: the explicit state machine for the Google
//!   account-linking handshake.
//! - [`auth::AuthService`]: the facade wiring it all together, one
//!   method per user-visible operation.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod hydrate;
pub mod linking;
pub mod oauth;
pub mod refresh;
pub mod scheduler;
pub mod store;
pub mod token;

pub use api::{AuthResponse, AuthUser, InviteDetails, LinkCollisionDetails, RegisterPayload};
pub use auth::{AuthService, LoginOutcome};
pub use config::SessionConfig;
pub use error::{ApiError, ConflictCode};
pub use events::SessionEvent;
pub use http::ApiClient;
pub use hydrate::{hydrate_session, HydrateOutcome, LaunchContext};
pub use linking::{CancelDestination, LinkFlow, LinkOrigin, LinkState};
pub use oauth::{google_auth_url, OAuthMode};
pub use refresh::{RefreshCoordinator, RefreshError};
pub use scheduler::RefreshScheduler;
pub use store::{Session, SessionStatus, SessionStore};

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times, only the first call has effect.
#[cfg(test)]
pub(crate) fn ensure_test_crypto() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

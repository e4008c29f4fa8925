// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Events broadcast by the session store on every state transition.
//!
//! Collaborators (the proactive-refresh scheduler, UI layers) react to
//! these instead of polling the store.

/// A session state transition.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The access token (and optionally the CSRF token) changed: login,
    /// register, successful refresh, or Google auth.
    TokensSet {
        /// New access token; `None` means the token was cleared.
        access_token: Option<String>,
    },
    /// The user snapshot was replaced.
    UserSet { authenticated: bool },
    /// The session was reset to logged-out state.
    LoggedOut,
    /// A refresh flight failed fatally; the store has been reset.
    RefreshFailed { error: String },
}

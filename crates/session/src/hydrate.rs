// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Session hydration on app launch.
//!
//! A fresh process has no access token but may hold a live refresh
//! cookie. Hydration tries one refresh and then fetches the verified
//! user snapshot. Failures are an expected outcome (first visit, cookie
//! expired), so hydration never propagates an error: it settles the
//! store as unauthenticated and reports which way it went.

use tracing::{debug, info};

use crate::auth::AuthService;

/// What the process was launched with.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    /// OAuth authorization code present in the launch URL, if any.
    pub oauth_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    /// Launched as an OAuth callback; the code exchange owns session
    /// setup and a concurrent hydration refresh would race it.
    SkippedForOauthCallback,
    Authenticated,
    Unauthenticated,
}

/// Restore the session from the refresh cookie, if possible.
pub async fn hydrate_session(auth: &AuthService, ctx: &LaunchContext) -> HydrateOutcome {
    if ctx.oauth_code.is_some() && auth.store().access_token().await.is_none() {
        debug!("oauth callback launch, skipping hydration");
        return HydrateOutcome::SkippedForOauthCallback;
    }

    auth.store().set_loading(true).await;

    if let Err(err) = auth.ensure_refresh().await {
        // refresh_failed already reset the store; settle as a plain
        // unauthenticated start but keep the message visible.
        debug!(error = %err, "hydration refresh failed");
        auth.store().set_unauthenticated(Some(err.to_string())).await;
        auth.store().set_loading(false).await;
        return HydrateOutcome::Unauthenticated;
    }

    match auth.fetch_current_user().await {
        Ok(user) => {
            info!(user = user.id, "session hydrated");
            auth.store().set_loading(false).await;
            HydrateOutcome::Authenticated
        }
        Err(err) => {
            debug!(error = %err, "hydration user fetch failed");
            auth.store()
                .set_unauthenticated(Some(err.message()))
                .await;
            auth.store().set_loading(false).await;
            HydrateOutcome::Unauthenticated
        }
    }
}

#[cfg(test)]
#[path = "hydrate_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default margin before token expiry to trigger a proactive refresh.
const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default retry budget for transient refresh failures.
const DEFAULT_REFRESH_MAX_RETRIES: u32 = 2;

/// Name of the CSRF double-submit cookie set by the backend.
pub const DEFAULT_CSRF_COOKIE: &str = "customerCsrfToken";

/// Configuration for the session client.
///
/// Loadable from JSON; every field except `base_url` has a sensible default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the marketplace API, no trailing slash
    /// (e.g. `https://api.quayside.example` or `http://127.0.0.1:3000`).
    pub base_url: String,

    /// Seconds before token expiry to schedule a proactive refresh.
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,

    /// Name of the CSRF cookie used as a fallback when the in-memory
    /// CSRF token is absent (page-reload case).
    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie_name: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Transient-failure retries inside a refresh flight before the
    /// failure becomes fatal and forces a local logout.
    #[serde(default = "default_refresh_retries")]
    pub refresh_max_retries: u32,

    /// Google OAuth client id. Empty disables the Google sign-in helpers.
    #[serde(default)]
    pub google_client_id: String,
}

fn default_refresh_margin() -> u64 {
    DEFAULT_REFRESH_MARGIN_SECS
}

fn default_csrf_cookie() -> String {
    DEFAULT_CSRF_COOKIE.to_owned()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_refresh_retries() -> u32 {
    DEFAULT_REFRESH_MAX_RETRIES
}

impl SessionConfig {
    /// Config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_margin_secs: default_refresh_margin(),
            csrf_cookie_name: default_csrf_cookie(),
            request_timeout_secs: default_request_timeout(),
            refresh_max_retries: default_refresh_retries(),
            google_client_id: String::new(),
        }
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

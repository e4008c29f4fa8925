// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! HTTP client for the marketplace API.
//!
//! Request path: attach `Authorization: Bearer` whenever an access token
//! is present; attach the CSRF header only on the refresh and logout
//! endpoints (the two calls authenticated by the refresh cookie rather
//! than the bearer token), using the store's CSRF token or the CSRF
//! cookie as a page-reload fallback.
//!
//! Response path: an expired-token 401 triggers the single-flight
//! refresh and exactly one replay with the new bearer. Refresh and
//! logout calls never trigger a refresh themselves, and non-expiry 401s
//! propagate unchanged.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::refresh::RefreshCoordinator;
use crate::store::SessionStore;

/// Base path of all auth endpoints.
pub const AUTH_BASE: &str = "/marketplace/auth";
pub const REFRESH_ENDPOINT: &str = "/marketplace/auth/refresh";
pub const LOGOUT_ENDPOINT: &str = "/marketplace/auth/logout";
/// CSRF double-submit header.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Client for all marketplace API calls, with token lifecycle handling.
#[derive(Clone)]
pub struct ApiClient {
    config: SessionConfig,
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    http: reqwest::Client,
    jar: Arc<Jar>,
}

impl ApiClient {
    pub fn new(
        config: SessionConfig,
        store: Arc<SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        http: reqwest::Client,
        jar: Arc<Jar>,
    ) -> Self {
        Self {
            config,
            store,
            coordinator,
            http,
            jar,
        }
    }

    /// GET returning JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.execute(Method::GET, path, None).await?;
        decode_body(&body)
    }

    /// POST a JSON body, returning JSON.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let body = self.execute(Method::POST, path, Some(body)).await?;
        decode_body(&body)
    }

    /// POST where the response body is ignored (204/empty endpoints).
    pub async fn post_unit(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(), ApiError> {
        self.execute(Method::POST, path, body).await?;
        Ok(())
    }

    /// Send a request, refreshing and replaying once on an expired-token
    /// 401. Returns the raw success body.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, ApiError> {
        let mut retried = false;
        loop {
            let resp = self.send_once(method.clone(), path, body).await?;
            let status = resp.status();

            if status.is_success() {
                return resp
                    .text()
                    .await
                    .map_err(|e| ApiError::Transport(format!("read body: {e}")));
            }

            let www = resp
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let text = resp.text().await.unwrap_or_default();
            let err = ApiError::classify(status.as_u16(), www.as_deref(), &text);

            let refresh_eligible = matches!(err, ApiError::TokenExpired)
                && !retried
                && !path.starts_with(REFRESH_ENDPOINT)
                && !path.starts_with(LOGOUT_ENDPOINT);

            if !refresh_eligible {
                return Err(err);
            }

            retried = true;
            debug!(path, "expired-token 401, refreshing and replaying once");
            match self.coordinator.ensure_refresh().await {
                Ok(_token) => continue,
                // The original request rejects with the refresh error.
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut req = self.http.request(method, &url);

        if let Some(token) = self.store.access_token().await {
            req = req.bearer_auth(token);
        }
        if path.starts_with(REFRESH_ENDPOINT) || path.starts_with(LOGOUT_ENDPOINT) {
            if let Some(csrf) = self.csrf_token().await {
                req = req.header(CSRF_HEADER, csrf);
            }
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        req.send()
            .await
            .map_err(|e| ApiError::Transport(format!("request failed: {e}")))
    }

    /// CSRF token from the store, falling back to the CSRF cookie.
    async fn csrf_token(&self) -> Option<String> {
        if let Some(csrf) = self.store.csrf_token().await {
            return Some(csrf);
        }
        let base = Url::parse(&self.config.base_url).ok()?;
        cookie_value(self.jar.as_ref(), &base, &self.config.csrf_cookie_name)
    }
}

fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Transport(format!("decode response: {e}")))
}

/// Read one cookie's value out of a jar for the given origin.
pub(crate) fn cookie_value(jar: &Jar, base: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(base)?;
    let raw = header.to_str().ok()?;
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_owned())
}

/// Minimal percent-encoding for query values.
pub(crate) fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{b:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

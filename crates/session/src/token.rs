// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Failure-tolerant JWT payload decoding for UX-only claims.
//!
//! This is never a trust boundary: claims feed the proactive-refresh
//! timer and nothing else. Anything undecodable yields `None` and the
//! caller simply skips scheduling.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Claims read from the access token payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

/// Decode the payload segment of a three-part dot-separated token.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry claim as epoch seconds, if present and decodable.
pub fn expires_at(token: &str) -> Option<u64> {
    decode_claims(token)?.exp
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;

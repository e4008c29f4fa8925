// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Error taxonomy for calls against the auth backend.
//!
//! Classification happens once, from the HTTP status, the
//! `WWW-Authenticate` challenge, and the (loosely shaped) error body:
//! structured 409 conflicts are alternate success paths, expired-token
//! 401s trigger a silent refresh, and everything else surfaces as a
//! user-readable message.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

/// Known structured conflict codes returned with HTTP 409.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCode {
    /// A business account exists for this email but lacks marketplace
    /// access; the UI offers to send an invite email.
    AccountExistsNeedsMarketplaceAccess,
    /// A password account exists for this Google identity and is not
    /// linked yet; the backend issued a link transaction.
    AccountExistsUnlinkedGoogle,
}

/// Error from a call through the API client.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Structured conflict (alternate success path, opens a modal).
    Conflict {
        code: ConflictCode,
        details: serde_json::Value,
    },
    /// 401 caused by an expired access token. The client refreshes and
    /// replays once; callers only see this on the refresh/logout
    /// endpoints themselves or after the single replay also expired.
    TokenExpired,
    /// Any other auth/validation failure, with the message extracted
    /// from the response body.
    Auth { status: u16, message: String },
    /// Network, timeout, or body-decode failure.
    Transport(String),
}

impl ApiError {
    /// Human-readable message for display, regardless of variant.
    pub fn message(&self) -> String {
        match self {
            Self::Conflict { code, .. } => match code {
                ConflictCode::AccountExistsNeedsMarketplaceAccess => {
                    "Account exists but needs marketplace access".to_owned()
                }
                ConflictCode::AccountExistsUnlinkedGoogle => {
                    "Account exists but Google is not linked".to_owned()
                }
            },
            Self::TokenExpired => "Session token expired".to_owned(),
            Self::Auth { message, .. } => message.clone(),
            Self::Transport(msg) => msg.clone(),
        }
    }

    /// Classify a non-success response.
    ///
    /// `www_authenticate` is the raw challenge header, if any; `body` is
    /// the raw response text (may be empty or non-JSON).
    pub fn classify(status: u16, www_authenticate: Option<&str>, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

        let conflict = match parsed.code.as_deref() {
            Some("account_exists_needs_marketplace_access") => {
                Some(ConflictCode::AccountExistsNeedsMarketplaceAccess)
            }
            Some("account_exists_unlinked_google") => {
                Some(ConflictCode::AccountExistsUnlinkedGoogle)
            }
            _ => None,
        };
        if let Some(code) = conflict {
            return Self::Conflict {
                code,
                details: parsed.details.clone().unwrap_or(serde_json::Value::Null),
            };
        }

        if status == 401 && is_expired_401(www_authenticate, &parsed) {
            return Self::TokenExpired;
        }

        let fallback = format!("HTTP {status}");
        Self::Auth {
            status,
            message: parsed.extract_message(&fallback),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { code, .. } => write!(f, "conflict: {code:?}"),
            Self::TokenExpired => write!(f, "token expired"),
            Self::Auth { status, message } => write!(f, "auth error ({status}): {message}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Loose error body shape. The backend sends `message` as either a
/// string or an array of strings; `error` is an alternate field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Extract a single display message: first element of an array
    /// message, a string message, the `error` field, or the fallback.
    pub fn extract_message(&self, fallback: &str) -> String {
        match &self.message {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(serde_json::Value::Array(items)) => {
                let strings: Vec<&str> =
                    items.iter().filter_map(|v| v.as_str()).collect();
                if let Some(first) = strings.first() {
                    if !first.is_empty() {
                        return (*first).to_owned();
                    }
                    return strings.join(". ");
                }
            }
            _ => {}
        }
        if let Some(err) = self.error.as_deref() {
            if !err.is_empty() {
                return err.to_owned();
            }
        }
        fallback.to_owned()
    }
}

/// Whether a 401 is specifically an expired-token failure: either a
/// `WWW-Authenticate: ... error="invalid_token" ... expired` challenge,
/// or a body code/message mentioning expiry.
pub fn is_expired_401(www_authenticate: Option<&str>, body: &ErrorBody) -> bool {
    if let Some(www) = www_authenticate {
        if expired_challenge(www) {
            return true;
        }
    }
    if body.code.as_deref() == Some("token_expired") {
        return true;
    }
    let body_text = match &body.message {
        Some(serde_json::Value::String(s)) => Some(s.as_str()),
        _ => body.error.as_deref(),
    };
    matches!(body_text, Some(t) if t.to_ascii_lowercase().contains("expired"))
}

fn expired_challenge(www: &str) -> bool {
    static INVALID_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = INVALID_TOKEN.get_or_init(|| Regex::new(r#"(?i)error="invalid_token""#).ok());
    match re {
        Some(re) => re.is_match(www) && www.to_ascii_lowercase().contains("expired"),
        None => false,
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

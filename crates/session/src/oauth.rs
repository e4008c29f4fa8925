// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Google OAuth redirect URL construction.

use crate::http::urlencoded;

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const SCOPES: &str = "openid email profile";

/// What the user is in the middle of when they leave for Google. Comes
/// back in the `state` parameter so the callback can resume the right
/// flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthMode {
    Login,
    Register,
    Link,
}

impl OAuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Link => "link",
        }
    }
}

/// Build the consent-screen URL for the authorization-code flow.
///
/// `access_type=offline` and `prompt=consent` force a refresh-capable
/// grant even for returning users.
pub fn google_auth_url(client_id: &str, redirect_uri: &str, mode: OAuthMode) -> String {
    format!(
        "{GOOGLE_AUTH_ENDPOINT}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
        urlencoded(client_id),
        urlencoded(redirect_uri),
        urlencoded(SCOPES),
        urlencoded(mode.as_str()),
    )
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Wire types for the marketplace auth backend.
//!
//! Field names on the wire are camelCase, matching the backend's JSON
//! contract. The one exception is the link-confirmation body, which the
//! backend expects as `{tx_id, proof}`.

use serde::{Deserialize, Serialize};

/// Authenticated user snapshot, replaced wholesale on each fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Google subject claim when a Google identity is linked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_via: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_google_login_at: Option<String>,
}

/// Response shape shared by login, register, Google auth, and link calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
    pub user: AuthUser,
}

/// Response from `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

/// Authorization-code exchange payload for the Google endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCodePayload {
    pub code: String,
    pub redirect_uri: String,
}

/// Password re-authentication payload for the linking flow. The server
/// ties the proof to the collision transaction it issued; the body
/// carries only the credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReauthPayload {
    pub email: String,
    pub password: String,
}

/// Link-confirmation payload. Snake-case on the wire per backend contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkGooglePayload {
    pub tx_id: String,
    pub proof: String,
}

/// Response from `GET /auth/me`: the verified snapshot, wrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub user: AuthUser,
}

/// Response from the re-auth call: a one-time linking proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofResponse {
    pub proof: String,
}

/// Generic `{message}` response (logout-adjacent and link-invite calls).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailResponse {
    pub message: String,
    #[serde(default)]
    pub success: bool,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyAccountLinkResponse {
    pub message: String,
    pub user: AuthUser,
}

/// Details carried by a 409 `account_exists_needs_marketplace_access`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteDetails {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

/// Details carried by an `account_exists_unlinked_google` conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCollisionDetails {
    #[serde(default)]
    pub tx_id: String,
    #[serde(default, rename = "suggestedNext")]
    pub suggested_next: Option<String>,
}

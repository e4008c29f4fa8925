// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! Test harness for end-to-end session tests.
//!
//! Runs a scripted in-process marketplace auth backend (axum) that a
//! real [`quayside_session::AuthService`] talks to over loopback HTTP.
//! The backend mints real JWTs, tracks which access token is currently
//! valid, counts wire calls, and records the bodies of the linking
//! handshake so tests can assert the exact wire contract.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::net::TcpListener;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times, only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

const EXPIRED_CHALLENGE: &str =
    r#"Bearer error="invalid_token", error_description="The access token expired""#;

/// Google codes the mock backend reacts to with a 409 instead of a
/// session.
pub const CODE_COLLIDE_INVITE: &str = "collide-invite";
pub const CODE_COLLIDE_LINK: &str = "collide-link";

pub const TX_ID: &str = "tx-spec";
pub const PROOF: &str = "proof-spec";
pub const PASSWORD: &str = "hunter2";

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Shared state behind the mock backend's handlers.
pub struct BackendState {
    refresh_calls: AtomicU32,
    profile_calls: AtomicU32,
    token_serial: AtomicU32,
    token_ttl_secs: AtomicU64,
    reject_refresh: AtomicBool,
    valid_token: Mutex<Option<String>>,
    last_link_body: Mutex<Option<serde_json::Value>>,
    last_reauth_body: Mutex<Option<serde_json::Value>>,
}

impl BackendState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            refresh_calls: AtomicU32::new(0),
            profile_calls: AtomicU32::new(0),
            token_serial: AtomicU32::new(0),
            token_ttl_secs: AtomicU64::new(3600),
            reject_refresh: AtomicBool::new(false),
            valid_token: Mutex::new(None),
            last_link_body: Mutex::new(None),
            last_reauth_body: Mutex::new(None),
        })
    }

    /// Mint a JWT, record it as the one valid token.
    fn issue_token(&self) -> String {
        let serial = self.token_serial.fetch_add(1, Ordering::Relaxed) + 1;
        let exp = now_secs() + self.token_ttl_secs.load(Ordering::Relaxed);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({ "exp": exp, "sub": "7", "jti": format!("jwt-{serial}") })
                .to_string(),
        );
        let token = format!("{header}.{payload}.spec-sig");
        *self.valid_token.lock() = Some(token.clone());
        token
    }

    fn bearer_is_current(&self, headers: &HeaderMap) -> bool {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        match self.valid_token.lock().as_deref() {
            Some(valid) => auth == format!("Bearer {valid}"),
            None => false,
        }
    }

    fn auth_response(&self) -> Response {
        let token = self.issue_token();
        let body = serde_json::json!({
            "accessToken": token,
            "csrfToken": "csrf-wire",
            "user": sample_user()
        })
        .to_string();
        (
            StatusCode::OK,
            AppendHeaders([
                (header::SET_COOKIE, "refreshToken=rt-spec; Path=/; HttpOnly"),
                (header::SET_COOKIE, "customerCsrfToken=csrf-cookie; Path=/"),
            ]),
            body,
        )
            .into_response()
    }
}

fn sample_user() -> serde_json::Value {
    serde_json::json!({
        "id": 7,
        "email": "pat@example.com",
        "firstName": "Pat",
        "lastName": "Quay"
    })
}

fn expired_401() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        AppendHeaders([(header::WWW_AUTHENTICATE, EXPIRED_CHALLENGE)]),
        r#"{"code":"token_expired","message":"jwt expired"}"#,
    )
        .into_response()
}

async fn login(
    State(st): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if body["password"] == PASSWORD {
        st.auth_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            r#"{"message":"Invalid email or password"}"#,
        )
            .into_response()
    }
}

async fn google(
    State(st): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    match body["code"].as_str() {
        Some(CODE_COLLIDE_INVITE) => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "code": "account_exists_needs_marketplace_access",
                "details": sample_user()
            })
            .to_string(),
        )
            .into_response(),
        Some(CODE_COLLIDE_LINK) => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "code": "account_exists_unlinked_google",
                "details": { "tx_id": TX_ID, "suggestedNext": "reauth" }
            })
            .to_string(),
        )
            .into_response(),
        _ => st.auth_response(),
    }
}

async fn reauth(
    State(st): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    *st.last_reauth_body.lock() = Some(body.clone());
    if body["password"] != PASSWORD {
        return (StatusCode::UNAUTHORIZED, r#"{"message":"Wrong password"}"#).into_response();
    }
    (StatusCode::OK, format!(r#"{{"proof":"{PROOF}"}}"#)).into_response()
}

async fn link(
    State(st): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    *st.last_link_body.lock() = Some(body.clone());
    if body["tx_id"] == TX_ID && body["proof"] == PROOF {
        st.auth_response()
    } else {
        (StatusCode::GONE, r#"{"message":"link transaction expired"}"#).into_response()
    }
}

async fn refresh(State(st): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    st.refresh_calls.fetch_add(1, Ordering::Relaxed);
    if st.reject_refresh.load(Ordering::Relaxed) {
        return (
            StatusCode::UNAUTHORIZED,
            r#"{"message":"Refresh token revoked"}"#,
        )
            .into_response();
    }
    // The refresh cookie must have been planted by a prior sign-in.
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !cookie.contains("refreshToken=rt-spec") {
        return (StatusCode::UNAUTHORIZED, r#"{"message":"No refresh token"}"#).into_response();
    }
    let token = st.issue_token();
    (
        StatusCode::OK,
        serde_json::json!({ "accessToken": token }).to_string(),
    )
        .into_response()
}

async fn me(State(st): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if st.bearer_is_current(&headers) {
        (
            StatusCode::OK,
            serde_json::json!({ "user": sample_user() }).to_string(),
        )
            .into_response()
    } else {
        expired_401()
    }
}

async fn profile(State(st): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    st.profile_calls.fetch_add(1, Ordering::Relaxed);
    if st.bearer_is_current(&headers) {
        (StatusCode::OK, r#"{"plan":"standard"}"#).into_response()
    } else {
        expired_401()
    }
}

async fn logout(State(st): State<Arc<BackendState>>) -> Response {
    // Revoke everything: the valid token and the refresh cookie.
    *st.valid_token.lock() = None;
    st.reject_refresh.store(true, Ordering::Relaxed);
    (StatusCode::OK, r#"{"message":"Logged out"}"#).into_response()
}

/// A scripted marketplace auth backend bound to a loopback port.
pub struct MockMarketplace {
    addr: SocketAddr,
    state: Arc<BackendState>,
}

impl MockMarketplace {
    pub async fn start() -> anyhow::Result<Self> {
        ensure_crypto();
        let state = BackendState::new();
        let app = Router::new()
            .route("/marketplace/auth/login", post(login))
            .route("/marketplace/auth/google/code/login", post(google))
            .route("/marketplace/auth/google/code/register", post(google))
            .route("/marketplace/auth/link/google/re-auth", post(reauth))
            .route("/marketplace/auth/link/google", post(link))
            .route("/marketplace/auth/refresh", post(refresh))
            .route("/marketplace/auth/me", get(me))
            .route("/marketplace/auth/logout", post(logout))
            .route("/marketplace/api/profile", get(profile))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Invalidate the client's access token server-side without telling
    /// anyone, so its next request hits an expired-token 401.
    pub fn expire_session(&self) {
        let _ = self.state.issue_token();
    }

    /// Make every subsequent refresh fail with a rejection.
    pub fn revoke_refresh(&self) {
        self.state.reject_refresh.store(true, Ordering::Relaxed);
    }

    /// Lifetime of the next issued tokens, driving the `exp` claim.
    pub fn set_token_ttl(&self, secs: u64) {
        self.state.token_ttl_secs.store(secs, Ordering::Relaxed);
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn profile_calls(&self) -> u32 {
        self.state.profile_calls.load(Ordering::Relaxed)
    }

    pub fn last_link_body(&self) -> Option<serde_json::Value> {
        self.state.last_link_body.lock().clone()
    }

    pub fn last_reauth_body(&self) -> Option<serde_json::Value> {
        self.state.last_reauth_body.lock().clone()
    }
}

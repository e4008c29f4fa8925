// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! High-level auth service: wires the store, the HTTP client, the
//! refresh coordinator, the proactive scheduler, and the linking flow
//! together, and exposes one method per user-visible auth operation.

use std::sync::Arc;

use reqwest::cookie::Jar;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{
    AuthResponse, AuthUser, CurrentUserResponse, GoogleCodePayload, InviteDetails,
    LinkCollisionDetails, LinkGooglePayload, LoginPayload, MessageResponse, ProofResponse,
    RegisterPayload, ReauthPayload, VerifyAccountLinkResponse, VerifyEmailResponse,
};
use crate::config::SessionConfig;
use crate::error::{ApiError, ConflictCode};
use crate::events::SessionEvent;
use crate::http::{ApiClient, AUTH_BASE, LOGOUT_ENDPOINT};
use crate::linking::{CancelDestination, InvalidTransition, LinkFlow, LinkOrigin};
use crate::oauth::{self, OAuthMode};
use crate::refresh::{RefreshCoordinator, RefreshError};
use crate::scheduler::RefreshScheduler;
use crate::store::SessionStore;

/// Result of a sign-in attempt that did not outright fail.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(AuthUser),
    /// A business account exists but lacks marketplace access; the UI
    /// should offer to send the invite email.
    CollisionInvite(InviteDetails),
    /// An unlinked password account exists; the linking handshake has
    /// been opened with the server-issued transaction.
    LinkingRequired {
        tx_id: String,
        suggested_next: Option<String>,
    },
}

/// The auth facade. One instance per app session.
pub struct AuthService {
    config: SessionConfig,
    store: Arc<SessionStore>,
    api: ApiClient,
    coordinator: Arc<RefreshCoordinator>,
    scheduler: Arc<RefreshScheduler>,
    link_flow: LinkFlow,
}

impl AuthService {
    /// Build the full stack around a fresh store. The returned receiver
    /// carries session events from the very first transition.
    pub fn new(config: SessionConfig) -> Result<(Arc<Self>, broadcast::Receiver<SessionEvent>), ApiError> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(format!("build http client: {e}")))?;

        let (store, events) = SessionStore::new();
        let coordinator = RefreshCoordinator::new(
            config.clone(),
            Arc::clone(&store),
            http.clone(),
            Arc::clone(&jar),
        );
        let api = ApiClient::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&coordinator),
            http,
            jar,
        );
        let scheduler = RefreshScheduler::new(config.clone(), Arc::clone(&coordinator));

        let service = Arc::new(Self {
            config,
            store,
            api,
            coordinator,
            scheduler,
            link_flow: LinkFlow::new(),
        });
        Ok((service, events))
    }

    /// Run the proactive-refresh scheduler against this service's store.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let scheduler = Arc::clone(&self.scheduler);
        let events = self.store.subscribe();
        tokio::spawn(scheduler.run(events))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn link_flow(&self) -> &LinkFlow {
        &self.link_flow
    }

    /// Refresh now (or join the flight in progress).
    pub async fn ensure_refresh(&self) -> Result<String, RefreshError> {
        self.coordinator.ensure_refresh().await
    }

    /// Consent-screen URL for the given flow leg.
    pub fn google_auth_url(&self, redirect_uri: &str, mode: OAuthMode) -> String {
        oauth::google_auth_url(&self.config.google_client_id, redirect_uri, mode)
    }

    /// Password sign-in.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        self.store.set_loading(true).await;
        let payload = LoginPayload {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| ApiError::Transport(format!("encode payload: {e}")))?;
        let result = self
            .api
            .post_json::<AuthResponse>(&format!("{AUTH_BASE}/login"), &body)
            .await;
        self.finish_signin(LinkOrigin::Login, result).await
    }

    /// New-account registration.
    pub async fn register(&self, payload: &RegisterPayload) -> Result<LoginOutcome, ApiError> {
        self.store.set_loading(true).await;
        let body = serde_json::to_value(payload)
            .map_err(|e| ApiError::Transport(format!("encode payload: {e}")))?;
        let result = self
            .api
            .post_json::<AuthResponse>(&format!("{AUTH_BASE}/register"), &body)
            .await;
        self.finish_signin(LinkOrigin::Register, result).await
    }

    /// Exchange a Google authorization code for a session. `origin`
    /// records whether the user came from the login or register page, so
    /// a cancelled collision flow lands back where they started.
    pub async fn google_auth(
        &self,
        code: &str,
        redirect_uri: &str,
        origin: LinkOrigin,
    ) -> Result<LoginOutcome, ApiError> {
        self.store.set_loading(true).await;
        let payload = GoogleCodePayload {
            code: code.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| ApiError::Transport(format!("encode payload: {e}")))?;
        let path = match origin {
            LinkOrigin::Login => format!("{AUTH_BASE}/google/code/login"),
            LinkOrigin::Register => format!("{AUTH_BASE}/google/code/register"),
        };
        let result = self.api.post_json::<AuthResponse>(&path, &body).await;
        self.finish_signin(origin, result).await
    }

    /// Shared tail of the three sign-in paths: install the session on
    /// success, branch into the collision flows on a structured 409.
    async fn finish_signin(
        &self,
        origin: LinkOrigin,
        result: Result<AuthResponse, ApiError>,
    ) -> Result<LoginOutcome, ApiError> {
        match result {
            Ok(resp) => {
                self.install_session(resp).await.map(LoginOutcome::Authenticated)
            }
            Err(ApiError::Conflict { code, details }) => {
                self.store.set_loading(false).await;
                match code {
                    ConflictCode::AccountExistsNeedsMarketplaceAccess => {
                        let invite: InviteDetails =
                            serde_json::from_value(details).unwrap_or_default();
                        self.link_flow.open_invite(origin, invite.clone())?;
                        info!(email = %invite.email, "sign-in collision: invite offered");
                        Ok(LoginOutcome::CollisionInvite(invite))
                    }
                    ConflictCode::AccountExistsUnlinkedGoogle => {
                        let collision: LinkCollisionDetails =
                            serde_json::from_value(details).unwrap_or_default();
                        self.link_flow.open_linking(
                            origin,
                            collision.tx_id.clone(),
                            collision.suggested_next.clone(),
                        )?;
                        info!("sign-in collision: linking required");
                        Ok(LoginOutcome::LinkingRequired {
                            tx_id: collision.tx_id,
                            suggested_next: collision.suggested_next,
                        })
                    }
                }
            }
            Err(err) => {
                self.store.auth_failed(err.message()).await;
                Err(err)
            }
        }
    }

    async fn install_session(&self, resp: AuthResponse) -> Result<AuthUser, ApiError> {
        self.store
            .set_tokens(Some(resp.access_token), resp.csrf_token)
            .await;
        self.store.set_user(Some(resp.user.clone())).await;
        self.store.set_loading(false).await;
        debug!(user = resp.user.id, "session installed");
        Ok(resp.user)
    }

    /// Server-side logout plus local reset. If the server call fails the
    /// local session is kept and the error surfaced, so the user can see
    /// the failure and retry.
    pub async fn logout(&self) -> Result<(), ApiError> {
        match self.api.post_unit(LOGOUT_ENDPOINT, None).await {
            Ok(()) => {
                self.store.reset().await;
                self.link_flow.reset();
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "logout call failed");
                self.store.set_error(err.message()).await;
                Err(err)
            }
        }
    }

    /// Fetch the server-verified user snapshot and install it.
    pub async fn fetch_current_user(&self) -> Result<AuthUser, ApiError> {
        let resp: CurrentUserResponse = self.api.get_json(&format!("{AUTH_BASE}/me")).await?;
        self.store.set_user(Some(resp.user.clone())).await;
        Ok(resp.user)
    }

    /// Send the marketplace-access invite email offered after a
    /// needs-access collision.
    pub async fn send_account_link(&self, email: &str) -> Result<String, ApiError> {
        let resp: MessageResponse = self
            .api
            .post_json(
                &format!("{AUTH_BASE}/send-account-link"),
                &json!({ "email": email }),
            )
            .await?;
        self.link_flow.invite_sent()?;
        Ok(resp.message)
    }

    /// Redeem the emailed account-link token.
    pub async fn verify_account_link(
        &self,
        token: &str,
    ) -> Result<VerifyAccountLinkResponse, ApiError> {
        self.api
            .get_json(&format!(
                "{AUTH_BASE}/verify-account-link?token={}",
                crate::http::urlencoded(token)
            ))
            .await
    }

    /// Redeem an email-verification token and update the local flag.
    pub async fn verify_email(&self, token: &str) -> Result<VerifyEmailResponse, ApiError> {
        let resp: VerifyEmailResponse = self
            .api
            .get_json(&format!(
                "{AUTH_BASE}/verify-email?token={}",
                crate::http::urlencoded(token)
            ))
            .await?;
        self.store.mark_email_verified(&resp.user.email).await;
        Ok(resp)
    }

    /// Drive the linking handshake end to end from the modal: reauth
    /// with the password, then confirm the link with the returned proof,
    /// then install the session from the link response.
    ///
    /// A step failure drops the flow back to the modal with the error
    /// attached; a dead transaction resets the flow entirely.
    pub async fn submit_link_reauth(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, ApiError> {
        self.link_flow.begin_reauth()?;

        let payload = ReauthPayload {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| ApiError::Transport(format!("encode payload: {e}")))?;
        let proof = match self
            .api
            .post_json::<ProofResponse>(&format!("{AUTH_BASE}/link/google/re-auth"), &body)
            .await
        {
            Ok(resp) => resp.proof,
            Err(err) => return Err(self.linking_step_failed(err)),
        };
        self.link_flow.proof_obtained(proof)?;

        let (tx_id, proof) = self.link_flow.begin_link()?;
        let payload = LinkGooglePayload { tx_id, proof };
        let body = serde_json::to_value(&payload)
            .map_err(|e| ApiError::Transport(format!("encode payload: {e}")))?;
        let resp = match self
            .api
            .post_json::<AuthResponse>(&format!("{AUTH_BASE}/link/google"), &body)
            .await
        {
            Ok(resp) => resp,
            Err(err) => return Err(self.linking_step_failed(err)),
        };

        self.link_flow.linked()?;
        info!("account linked, session installed");
        self.install_session(resp).await
    }

    /// Route a reauth/link failure: a dead transaction (the server no
    /// longer knows the tx_id) kills the flow, anything else returns to
    /// the modal for another attempt.
    fn linking_step_failed(&self, err: ApiError) -> ApiError {
        let tx_dead = matches!(
            &err,
            ApiError::Auth { status, .. } if *status == 404 || *status == 410
        );
        if tx_dead {
            warn!("link transaction no longer valid, resetting flow");
            self.link_flow.session_expired(err.message());
        } else if let Err(invalid) = self.link_flow.step_failed(err.message()) {
            // Already outside the handshake; nothing to revert.
            debug!(error = %invalid, "link step failure outside handshake");
        }
        err
    }

    /// Link Google to the already-authenticated account by exchanging a
    /// fresh authorization code.
    pub async fn link_google_by_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthUser, ApiError> {
        let payload = GoogleCodePayload {
            code: code.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| ApiError::Transport(format!("encode payload: {e}")))?;
        let resp: VerifyAccountLinkResponse = self
            .api
            .post_json(&format!("{AUTH_BASE}/link/google/by-code"), &body)
            .await?;
        self.store.set_user(Some(resp.user.clone())).await;
        Ok(resp.user)
    }

    /// Detach the Google identity from the current account. Requires the
    /// account password so a hijacked session cannot strip the linkage.
    pub async fn unlink_google(&self, password: &str) -> Result<(), ApiError> {
        self.api
            .post_unit(
                &format!("{AUTH_BASE}/unlink/google"),
                Some(&json!({ "password": password })),
            )
            .await?;
        self.store.clear_google_linkage().await;
        Ok(())
    }

    /// Abandon the linking flow; returns where the UI should land.
    pub fn cancel_linking(&self) -> CancelDestination {
        self.link_flow.cancel()
    }
}

impl From<InvalidTransition> for ApiError {
    fn from(err: InvalidTransition) -> Self {
        ApiError::Auth {
            status: 400,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Quayside Labs Ltd.

//! End-to-end session lifecycle tests against the scripted marketplace
//! backend: refresh single-flight under concurrency, proactive refresh,
//! hydration, the Google linking handshake, and forced logout.

use std::time::Duration;

use quayside_session::{
    hydrate_session, AuthService, HydrateOutcome, LaunchContext, LinkOrigin, LinkState,
    LoginOutcome, SessionConfig, SessionEvent, SessionStatus,
};
use quayside_specs::{
    MockMarketplace, CODE_COLLIDE_INVITE, CODE_COLLIDE_LINK, PASSWORD, PROOF, TX_ID,
};

async fn signed_in_service(
    backend: &MockMarketplace,
) -> anyhow::Result<std::sync::Arc<AuthService>> {
    let (svc, _rx) = AuthService::new(SessionConfig::new(backend.base_url()))?;
    let outcome = svc.login("pat@example.com", PASSWORD).await?;
    anyhow::ensure!(
        matches!(outcome, LoginOutcome::Authenticated(_)),
        "login should authenticate"
    );
    Ok(svc)
}

#[tokio::test]
async fn concurrent_expired_requests_share_one_refresh() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let svc = signed_in_service(&backend).await?;

    backend.expire_session();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let api = svc.api().clone();
        handles.push(tokio::spawn(async move {
            api.get_json::<serde_json::Value>("/marketplace/api/profile").await
        }));
    }
    for handle in handles {
        let body = handle.await??;
        assert_eq!(body["plan"], "standard");
    }

    assert_eq!(backend.refresh_calls(), 1, "one flight for all callers");
    assert_eq!(backend.profile_calls(), 16, "each request failed once and replayed once");
    Ok(())
}

#[tokio::test]
async fn proactive_refresh_fires_before_expiry() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    backend.set_token_ttl(3);

    let mut config = SessionConfig::new(backend.base_url());
    config.refresh_margin_secs = 2;
    let (svc, _rx) = AuthService::new(config)?;
    svc.spawn_scheduler();

    svc.login("pat@example.com", PASSWORD).await?;
    let short_lived = svc.store().access_token().await;
    // Refreshed tokens are long-lived so only one flight happens.
    backend.set_token_ttl(3600);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(backend.refresh_calls(), 1);
    let current = svc.store().access_token().await;
    assert_ne!(current, short_lived, "token rotated before expiry");

    // The rotated token is accepted without any 401 round trip.
    let body: serde_json::Value = svc.api().get_json("/marketplace/api/profile").await?;
    assert_eq!(body["plan"], "standard");
    assert_eq!(backend.profile_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn session_survives_a_reload_via_the_refresh_cookie() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let svc = signed_in_service(&backend).await?;

    // Reload: in-memory state is gone, the cookie jar survives.
    svc.store().reset().await;
    assert!(svc.store().access_token().await.is_none());

    let outcome = hydrate_session(&svc, &LaunchContext::default()).await;
    assert_eq!(outcome, HydrateOutcome::Authenticated);

    let s = svc.store().snapshot().await;
    assert_eq!(s.status, SessionStatus::Authenticated);
    assert_eq!(s.user.map(|u| u.email), Some("pat@example.com".to_owned()));
    assert_eq!(backend.refresh_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn oauth_callback_launch_skips_hydration() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let (svc, _rx) = AuthService::new(SessionConfig::new(backend.base_url()))?;

    let ctx = LaunchContext { oauth_code: Some("fresh-code".to_owned()) };
    let outcome = hydrate_session(&svc, &ctx).await;

    assert_eq!(outcome, HydrateOutcome::SkippedForOauthCallback);
    assert_eq!(backend.refresh_calls(), 0, "no refresh may race the code exchange");
    Ok(())
}

#[tokio::test]
async fn first_visit_hydration_settles_unauthenticated() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let (svc, _rx) = AuthService::new(SessionConfig::new(backend.base_url()))?;

    let outcome = hydrate_session(&svc, &LaunchContext::default()).await;
    assert_eq!(outcome, HydrateOutcome::Unauthenticated);

    let s = svc.store().snapshot().await;
    assert_eq!(s.status, SessionStatus::Unauthenticated);
    assert!(s.error.is_some(), "the refusal message is kept for the caller");
    Ok(())
}

#[tokio::test]
async fn google_collision_runs_the_linking_handshake() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let (svc, _rx) = AuthService::new(SessionConfig::new(backend.base_url()))?;

    let outcome = svc
        .google_auth(CODE_COLLIDE_LINK, "https://shop.example/cb", LinkOrigin::Login)
        .await?;
    match outcome {
        LoginOutcome::LinkingRequired { tx_id, .. } => assert_eq!(tx_id, TX_ID),
        other => anyhow::bail!("expected LinkingRequired, got {other:?}"),
    }

    let user = svc.submit_link_reauth("pat@example.com", PASSWORD).await?;
    assert_eq!(user.id, 7);
    assert_eq!(svc.link_flow().state(), LinkState::Linked);

    // Exact wire contract of the two handshake calls.
    let reauth = backend.last_reauth_body().ok_or_else(|| anyhow::anyhow!("no reauth body"))?;
    assert_eq!(
        reauth,
        serde_json::json!({ "email": "pat@example.com", "password": PASSWORD })
    );
    let link = backend.last_link_body().ok_or_else(|| anyhow::anyhow!("no link body"))?;
    assert_eq!(link, serde_json::json!({ "tx_id": TX_ID, "proof": PROOF }));

    // The link response signed the user in.
    let s = svc.store().snapshot().await;
    assert_eq!(s.status, SessionStatus::Authenticated);
    let body: serde_json::Value = svc.api().get_json("/marketplace/api/profile").await?;
    assert_eq!(body["plan"], "standard");
    Ok(())
}

#[tokio::test]
async fn invite_collision_offers_the_invite() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let (svc, _rx) = AuthService::new(SessionConfig::new(backend.base_url()))?;

    let outcome = svc
        .google_auth(CODE_COLLIDE_INVITE, "https://shop.example/cb", LinkOrigin::Register)
        .await?;
    match outcome {
        LoginOutcome::CollisionInvite(details) => {
            assert_eq!(details.email, "pat@example.com");
        }
        other => anyhow::bail!("expected CollisionInvite, got {other:?}"),
    }
    assert!(matches!(svc.link_flow().state(), LinkState::InviteOffered { .. }));
    assert!(svc.store().access_token().await.is_none());
    Ok(())
}

#[tokio::test]
async fn revoked_refresh_forces_a_local_logout() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let (svc, mut rx) = AuthService::new(SessionConfig::new(backend.base_url()))?;
    svc.login("pat@example.com", PASSWORD).await?;

    backend.expire_session();
    backend.revoke_refresh();

    let result = svc.api().get_json::<serde_json::Value>("/marketplace/api/profile").await;
    assert!(result.is_err(), "request must fail when the refresh is rejected");

    let s = svc.store().snapshot().await;
    assert_eq!(s.status, SessionStatus::Unauthenticated);
    assert!(s.access_token.is_none());

    // The store announced the forced logout.
    let mut saw_refresh_failed = false;
    let mut saw_logged_out = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            SessionEvent::RefreshFailed { .. } => saw_refresh_failed = true,
            SessionEvent::LoggedOut => saw_logged_out = true,
            _ => {}
        }
    }
    assert!(saw_refresh_failed);
    assert!(saw_logged_out);
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_session_on_both_sides() -> anyhow::Result<()> {
    let backend = MockMarketplace::start().await?;
    let svc = signed_in_service(&backend).await?;

    svc.logout().await?;
    assert_eq!(svc.store().snapshot().await.status, SessionStatus::Unauthenticated);

    // The server revoked the refresh cookie, so nothing can come back.
    let result = svc.api().get_json::<serde_json::Value>("/marketplace/api/profile").await;
    assert!(result.is_err());
    assert_eq!(svc.store().snapshot().await.status, SessionStatus::Unauthenticated);
    Ok(())
}

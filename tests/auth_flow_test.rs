mod common;

use std::{
    collections::HashMap,
    sync::{Arc, atomic::Ordering},
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use common::{FakeTokenEndpoint, spotify_settings};
use moodmix::{
    AppError,
    management::{AUTH_SESSION_TTL_SECS, AuthFlow, AuthState},
};
use sha2::{Digest, Sha256};

fn flow(endpoint: Arc<FakeTokenEndpoint>) -> AuthFlow {
    AuthFlow::new(spotify_settings(), endpoint)
}

#[test]
fn test_begin_login_binds_state_and_challenge() {
    let now = Utc::now();
    let (session, url) = flow(Arc::new(FakeTokenEndpoint::default())).begin_login(now);

    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(query["state"], session.state);
    assert_eq!(query["code_challenge_method"], "S256");
    assert_eq!(query["response_type"], "code");
    assert_eq!(
        query["code_challenge"],
        URL_SAFE_NO_PAD.encode(Sha256::digest(session.pkce_verifier.as_bytes()))
    );
    assert_eq!(session.expires_at - session.created_at, Duration::seconds(AUTH_SESSION_TTL_SECS));
    assert!(url.as_str().starts_with("https://accounts.example.com/authorize?"));
}

#[test]
fn test_each_login_gets_fresh_secrets() {
    let flow = flow(Arc::new(FakeTokenEndpoint::default()));
    let (a, _) = flow.begin_login(Utc::now());
    let (b, _) = flow.begin_login(Utc::now());
    assert_ne!(a.state, b.state);
    assert_ne!(a.pkce_verifier, b.pkce_verifier);
}

#[tokio::test]
async fn test_successful_callback() {
    let endpoint = Arc::new(FakeTokenEndpoint::default());
    let flow = flow(endpoint.clone());
    let now = Utc::now();
    let (session, _) = flow.begin_login(now);
    let state = session.state.clone();

    let pair = flow
        .complete_callback(Some(session), Some("good-code"), Some(&state), now)
        .await
        .unwrap();

    assert_eq!(pair.access_token, "at-login");
    assert_eq!(pair.refresh_token.as_deref(), Some("rt-login"));
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(AuthState::of(None, Some(&pair), now), AuthState::Authenticated);
}

#[tokio::test]
async fn test_state_mismatch_wins_over_valid_code() {
    let endpoint = Arc::new(FakeTokenEndpoint::default());
    let flow = flow(endpoint.clone());
    let now = Utc::now();

    for code in [Some("good-code"), None, Some("")] {
        let (session, _) = flow.begin_login(now);
        let result = flow
            .complete_callback(Some(session), code, Some("forged"), now)
            .await;
        assert!(matches!(result, Err(AppError::StateMismatch)));
    }
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_callback_without_pending_login() {
    let flow = flow(Arc::new(FakeTokenEndpoint::default()));
    let result = flow
        .complete_callback(None, Some("good-code"), Some("any"), Utc::now())
        .await;
    assert!(matches!(result, Err(AppError::StateMismatch)));
}

#[tokio::test]
async fn test_missing_code() {
    let flow = flow(Arc::new(FakeTokenEndpoint::default()));
    let now = Utc::now();
    let (session, _) = flow.begin_login(now);
    let state = session.state.clone();

    let result = flow
        .complete_callback(Some(session), None, Some(&state), now)
        .await;
    assert!(matches!(result, Err(AppError::MissingCode)));
}

#[tokio::test]
async fn test_expired_pending_login() {
    let flow = flow(Arc::new(FakeTokenEndpoint::default()));
    let started = Utc::now() - Duration::seconds(AUTH_SESSION_TTL_SECS + 1);
    let (session, _) = flow.begin_login(started);
    let state = session.state.clone();
    assert_eq!(AuthState::of(Some(&session), None, Utc::now()), AuthState::Unauthenticated);

    let result = flow
        .complete_callback(Some(session), Some("good-code"), Some(&state), Utc::now())
        .await;
    assert!(matches!(result, Err(AppError::StateMismatch)));
}

#[tokio::test]
async fn test_exchange_failure_is_coarse() {
    let endpoint = Arc::new(FakeTokenEndpoint::default());
    let flow = flow(endpoint.clone());
    let now = Utc::now();
    let (session, _) = flow.begin_login(now);
    let state = session.state.clone();
    assert_eq!(AuthState::of(Some(&session), None, now), AuthState::PendingCallback);

    let result = flow
        .complete_callback(Some(session), Some("bad-code"), Some(&state), now)
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::TokenExchangeFailed));
    assert_eq!(err.kind(), "TokenExchangeFailed");
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 1);
}

mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use chrono::{Duration as ChronoDuration, Utc};
use common::FakeTokenEndpoint;
use futures_util::future::join_all;
use moodmix::{
    AppError,
    management::{RefreshCoordinator, TokenManager},
    types::TokenPair,
};

fn expired_pair(refresh: Option<&str>) -> TokenPair {
    TokenPair {
        access_token: "stale".into(),
        access_expires_at: Utc::now() - ChronoDuration::seconds(5),
        refresh_token: refresh.map(String::from),
        scope: Default::default(),
    }
}

#[tokio::test]
async fn test_concurrent_refresh_hits_endpoint_once() {
    let endpoint = Arc::new(FakeTokenEndpoint::slow(Duration::from_millis(50)));
    let coordinator = Arc::new(RefreshCoordinator::new(endpoint.clone()));

    // five requests from the same browser, each with its own store
    let managers: Vec<TokenManager> = (0..5)
        .map(|_| TokenManager::new(Some(expired_pair(Some("rt-1"))), coordinator.clone()))
        .collect();

    let tokens = join_all(managers.iter().map(|m| m.get_valid_token())).await;

    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
    assert!(tokens.iter().all(|t| t.as_deref() == Some("at-1")));

    // a late request in the same expiry event gets the identical pair
    let late = TokenManager::new(Some(expired_pair(Some("rt-1"))), coordinator.clone());
    assert_eq!(late.get_valid_token().await.as_deref(), Some("at-1"));
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);

    let (pair, changed) = late.snapshot().await;
    assert!(changed);
    let pair = pair.unwrap();
    assert_eq!(pair.refresh_token.as_deref(), Some("rt-1"));
    assert!(pair.access_valid_at(Utc::now()));
}

#[tokio::test]
async fn test_same_manager_serialises_callers() {
    let endpoint = Arc::new(FakeTokenEndpoint::slow(Duration::from_millis(20)));
    let coordinator = Arc::new(RefreshCoordinator::new(endpoint.clone()));
    let manager = TokenManager::new(Some(expired_pair(Some("rt-2"))), coordinator);

    let (a, b) = tokio::join!(manager.get_valid_token(), manager.get_valid_token());

    assert_eq!(a, b);
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_sessions_refresh_independently() {
    let endpoint = Arc::new(FakeTokenEndpoint::default());
    let coordinator = Arc::new(RefreshCoordinator::new(endpoint.clone()));

    let a = TokenManager::new(Some(expired_pair(Some("rt-a"))), coordinator.clone());
    let b = TokenManager::new(Some(expired_pair(Some("rt-b"))), coordinator);

    let ta = a.get_valid_token().await;
    let tb = b.get_valid_token().await;

    assert_ne!(ta, tb);
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rejected_refresh_clears_session() {
    let endpoint = Arc::new(FakeTokenEndpoint::failing());
    let coordinator = Arc::new(RefreshCoordinator::new(endpoint));
    let manager = TokenManager::new(Some(expired_pair(Some("rt-dead"))), coordinator);

    assert!(matches!(
        manager.require_token().await,
        Err(AppError::Unauthenticated)
    ));
    assert_eq!(manager.snapshot().await, (None, true));
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_token_endpoint_outage_keeps_session() {
    let endpoint = Arc::new(FakeTokenEndpoint::unavailable());
    let coordinator = Arc::new(RefreshCoordinator::new(endpoint.clone()));
    let manager = TokenManager::new(Some(expired_pair(Some("rt-keep"))), coordinator);

    assert!(matches!(
        manager.require_token().await,
        Err(AppError::UpstreamHttpError { status: 503 })
    ));
    let (pair, changed) = manager.snapshot().await;
    assert!(!changed);
    assert_eq!(pair.unwrap().refresh_token.as_deref(), Some("rt-keep"));

    // outages are not remembered: the next call asks the endpoint again
    assert_eq!(manager.get_valid_token().await, None);
    assert!(manager.is_authenticated().await);
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_without_refresh_token_clears() {
    let endpoint = Arc::new(FakeTokenEndpoint::default());
    let coordinator = Arc::new(RefreshCoordinator::new(endpoint.clone()));
    let manager = TokenManager::new(Some(expired_pair(None)), coordinator);

    assert_eq!(manager.get_valid_token().await, None);
    assert_eq!(manager.snapshot().await, (None, true));
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_valid_token_is_returned_as_is() {
    let endpoint = Arc::new(FakeTokenEndpoint::default());
    let coordinator = Arc::new(RefreshCoordinator::new(endpoint.clone()));
    let pair = TokenPair {
        access_token: "fresh".into(),
        access_expires_at: Utc::now() + ChronoDuration::minutes(30),
        refresh_token: Some("rt".into()),
        scope: Default::default(),
    };
    let manager = TokenManager::new(Some(pair), coordinator);

    assert_eq!(manager.get_valid_token().await.as_deref(), Some("fresh"));
    assert_eq!(manager.snapshot().await.1, false);
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let endpoint = Arc::new(FakeTokenEndpoint::default());
    let manager = TokenManager::new(None, Arc::new(RefreshCoordinator::new(endpoint)));

    manager.clear().await;
    manager.clear().await;
    assert_eq!(manager.snapshot().await, (None, false));
}

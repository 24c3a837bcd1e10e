use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use tokio::sync::{Mutex, OnceCell};

use crate::{error::AppError, spotify::TokenEndpoint, types::TokenPair, utils::digest_hex};

/// How long a finished refresh stays shareable with late callers.
const REFRESH_GRACE: Duration = Duration::from_secs(30);

type SharedRefresh = Arc<OnceCell<RefreshOutcome>>;

#[derive(Clone)]
enum RefreshOutcome {
    Refreshed(TokenPair),
    Rejected,
    Unavailable(u16),
}

struct Flight {
    started: Instant,
    result: SharedRefresh,
}

/// Single-flight guard around the refresh-token grant.
///
/// Requests from the same browser carry the same refresh token, so the
/// flights are keyed by a digest of it: the first caller performs the
/// exchange, everyone else arriving during the same expiry event awaits that
/// exchange and receives the identical pair. The refresh token itself is
/// never used as a key or logged.
pub struct RefreshCoordinator {
    endpoint: Arc<dyn TokenEndpoint>,
    flights: Mutex<HashMap<String, Flight>>,
    grace: Duration,
}

impl RefreshCoordinator {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self::with_grace(endpoint, REFRESH_GRACE)
    }

    pub fn with_grace(endpoint: Arc<dyn TokenEndpoint>, grace: Duration) -> Self {
        Self {
            endpoint,
            flights: Mutex::new(HashMap::new()),
            grace,
        }
    }

    /// Returns the refreshed pair, or `None` when the refresh token was
    /// rejected (expired, revoked).
    ///
    /// # Errors
    ///
    /// [`AppError::UpstreamHttpError`] when the token endpoint failed for any
    /// other reason. Such a failure is not shared with later callers, so the
    /// next request retries.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenPair>, AppError> {
        let key = digest_hex(refresh_token);
        let result = {
            let mut flights = self.flights.lock().await;
            let now = Instant::now();
            flights.retain(|_, f| now.duration_since(f.started) < self.grace);
            flights
                .entry(key.clone())
                .or_insert_with(|| Flight {
                    started: now,
                    result: Arc::new(OnceCell::new()),
                })
                .result
                .clone()
        };

        let outcome = result
            .get_or_init(|| async {
                match self.endpoint.refresh_token(refresh_token).await {
                    Ok(grant) => {
                        tracing::debug!("Access token refreshed");
                        RefreshOutcome::Refreshed(TokenPair::from_grant(
                            grant,
                            Some(refresh_token.to_string()),
                            Utc::now(),
                        ))
                    }
                    Err(e) if is_rejection(&e) => {
                        tracing::info!(error = %e, "Refresh token rejected, session cleared");
                        RefreshOutcome::Rejected
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Token endpoint unavailable, session kept");
                        RefreshOutcome::Unavailable(upstream_status(&e))
                    }
                }
            })
            .await
            .clone();

        match outcome {
            RefreshOutcome::Refreshed(pair) => Ok(Some(pair)),
            RefreshOutcome::Rejected => Ok(None),
            RefreshOutcome::Unavailable(status) => {
                let mut flights = self.flights.lock().await;
                if flights
                    .get(&key)
                    .is_some_and(|f| Arc::ptr_eq(&f.result, &result))
                {
                    flights.remove(&key);
                }
                Err(AppError::UpstreamHttpError { status })
            }
        }
    }
}

/// A grant the endpoint refused, as opposed to an endpoint that failed.
fn is_rejection(e: &AppError) -> bool {
    match e {
        AppError::TokenExchangeFailed | AppError::Unauthenticated => true,
        AppError::UpstreamHttpError { status } => (400..500).contains(status),
        _ => false,
    }
}

fn upstream_status(e: &AppError) -> u16 {
    match e {
        AppError::UpstreamHttpError { status } => *status,
        AppError::Http(e) => e.status().map_or(502, |s| s.as_u16()),
        _ => 502,
    }
}

#[derive(Default)]
struct TokenSlot {
    pair: Option<TokenPair>,
    changed: bool,
}

/// Per-session token store.
///
/// Built from the request's cookies, consulted by every handler that talks
/// to Spotify, and read back once the handler is done so that a refreshed or
/// cleared pair is written into that same response. Calls on one manager
/// are serialised by its mutex; concurrent requests of the same session meet
/// in the [`RefreshCoordinator`].
#[derive(Clone)]
pub struct TokenManager {
    slot: Arc<Mutex<TokenSlot>>,
    refresher: Arc<RefreshCoordinator>,
}

impl TokenManager {
    pub fn new(pair: Option<TokenPair>, refresher: Arc<RefreshCoordinator>) -> Self {
        TokenManager {
            slot: Arc::new(Mutex::new(TokenSlot {
                pair,
                changed: false,
            })),
            refresher,
        }
    }

    /// Returns a usable access token, refreshing it first if needed.
    ///
    /// A rejected refresh clears the pair: the caller is unauthenticated from
    /// then on, and this is not a retryable condition. When the token
    /// endpoint is merely unavailable the pair is kept and `None` returned.
    pub async fn get_valid_token(&self) -> Option<String> {
        self.token().await.ok().flatten()
    }

    /// Like [`get_valid_token`](Self::get_valid_token), with a missing pair
    /// mapped to [`AppError::Unauthenticated`].
    ///
    /// # Errors
    ///
    /// [`AppError::UpstreamHttpError`] when a refresh was needed but the
    /// token endpoint failed. The session survives such an error.
    pub async fn require_token(&self) -> Result<String, AppError> {
        self.token().await?.ok_or(AppError::Unauthenticated)
    }

    async fn token(&self) -> Result<Option<String>, AppError> {
        let mut slot = self.slot.lock().await;

        let refresh_token = match &slot.pair {
            None => return Ok(None),
            Some(pair) if pair.access_valid_at(Utc::now()) => {
                return Ok(Some(pair.access_token.clone()));
            }
            Some(pair) => pair.refresh_token.clone(),
        };

        let Some(refresh_token) = refresh_token else {
            slot.pair = None;
            slot.changed = true;
            return Ok(None);
        };

        let refreshed = self.refresher.refresh(&refresh_token).await?;
        let token = refreshed.as_ref().map(|p| p.access_token.clone());
        slot.pair = refreshed;
        slot.changed = true;
        Ok(token)
    }

    /// Replaces the stored pair, e.g. after a successful callback.
    pub async fn store(&self, pair: TokenPair) {
        let mut slot = self.slot.lock().await;
        slot.pair = Some(pair);
        slot.changed = true;
    }

    /// Drops the stored pair. Idempotent.
    pub async fn clear(&self) {
        let mut slot = self.slot.lock().await;
        if slot.pair.is_some() {
            slot.pair = None;
            slot.changed = true;
        }
    }

    /// Current pair and whether it differs from what the session started with.
    pub async fn snapshot(&self) -> (Option<TokenPair>, bool) {
        let slot = self.slot.lock().await;
        (slot.pair.clone(), slot.changed)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.slot.lock().await.pair.is_some()
    }
}

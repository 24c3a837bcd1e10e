use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use url::Url;

use crate::{
    config::SpotifySettings,
    error::AppError,
    spotify::{TokenEndpoint, auth::authorize_url},
    types::{AuthSession, TokenPair},
    utils::{generate_challenge_pair, generate_state},
};

/// Lifetime of a pending login, and of the cookies that carry it.
pub const AUTH_SESSION_TTL_SECS: i64 = 600;

/// Where a browser stands in the login dance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    PendingCallback,
    Authenticated,
}

impl AuthState {
    /// Derives the state from what the session carries.
    ///
    /// An expired access token still counts as authenticated as long as a
    /// refresh token can renew it; without one the session has fallen back
    /// to unauthenticated.
    pub fn of(
        pending: Option<&AuthSession>,
        pair: Option<&TokenPair>,
        now: DateTime<Utc>,
    ) -> Self {
        match pair {
            Some(p) if p.access_valid_at(now) || p.refresh_token.is_some() => Self::Authenticated,
            _ => match pending {
                Some(s) if !s.is_expired(now) => Self::PendingCallback,
                _ => Self::Unauthenticated,
            },
        }
    }
}

/// Authorization-code + PKCE orchestration.
///
/// Stateless itself: the pending [`AuthSession`] travels with the browser
/// and is handed back on the callback.
pub struct AuthFlow {
    settings: SpotifySettings,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl AuthFlow {
    pub fn new(settings: SpotifySettings, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self { settings, endpoint }
    }

    /// Starts a login: fresh state and verifier, plus the authorize URL.
    ///
    /// The returned session replaces whatever login was pending before.
    pub fn begin_login(&self, now: DateTime<Utc>) -> (AuthSession, Url) {
        let (verifier, challenge) = generate_challenge_pair();
        let session = AuthSession {
            state: generate_state(),
            pkce_verifier: verifier,
            created_at: now,
            expires_at: now + Duration::seconds(AUTH_SESSION_TTL_SECS),
        };
        let url = authorize_url(&self.settings, &session.state, &challenge);
        (session, url)
    }

    /// Finishes a login.
    ///
    /// The state check runs first, so a forged or stale callback is reported
    /// as [`AppError::StateMismatch`] whatever the code. A missing or expired
    /// pending session is treated the same way. The pending session is
    /// consumed in every case; the caller must drop it whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`AppError::StateMismatch`]
    /// - [`AppError::MissingCode`]
    /// - [`AppError::TokenExchangeFailed`]
    pub async fn complete_callback(
        &self,
        pending: Option<AuthSession>,
        code: Option<&str>,
        returned_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AppError> {
        let Some(pending) = pending else {
            return Err(AppError::StateMismatch);
        };
        let returned_state = returned_state.unwrap_or_default();
        if !constant_time_eq(pending.state.as_bytes(), returned_state.as_bytes()) {
            return Err(AppError::StateMismatch);
        }
        if pending.is_expired(now) {
            return Err(AppError::StateMismatch);
        }

        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AppError::MissingCode)?;

        let grant = self
            .endpoint
            .exchange_code(code, &pending.pkce_verifier)
            .await
            .map_err(|_| AppError::TokenExchangeFailed)?;

        Ok(TokenPair::from_grant(grant, None, now))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

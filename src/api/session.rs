//! Cookie transport for the login flow and the token pair.
//!
//! All cookies live in a [`PrivateCookieJar`], so their contents are
//! encrypted and authenticated with the server key. Token values never
//! reach the browser in readable form.

use std::collections::BTreeSet;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    error::AppError,
    management::{AUTH_SESSION_TTL_SECS, TokenManager},
    types::{AuthSession, TokenPair},
};

use super::AppState;

pub const STATE_COOKIE: &str = "mm_state";
pub const PKCE_COOKIE: &str = "mm_pkce";
pub const ACCESS_COOKIE: &str = "mm_at";
pub const REFRESH_COOKIE: &str = "mm_rt";

const REFRESH_TTL_DAYS: i64 = 30;

#[derive(Serialize, Deserialize)]
struct PendingCookie {
    state: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct AccessCookie {
    access_token: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    scope: BTreeSet<String>,
}

fn cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").max_age(Duration::ZERO).build()
}

/// Stores the pending login. Replaces any login that was pending before.
pub fn store_pending(
    jar: PrivateCookieJar,
    session: &AuthSession,
    secure: bool,
) -> PrivateCookieJar {
    let pending = PendingCookie {
        state: session.state.clone(),
        created_at: session.created_at,
        expires_at: session.expires_at,
    };
    let Ok(pending) = serde_json::to_string(&pending) else {
        return jar;
    };
    let ttl = Duration::seconds(AUTH_SESSION_TTL_SECS);
    jar.add(cookie(STATE_COOKIE, pending, ttl, secure))
        .add(cookie(PKCE_COOKIE, session.pkce_verifier.clone(), ttl, secure))
}

pub fn read_pending(jar: &PrivateCookieJar) -> Option<AuthSession> {
    let pending: PendingCookie = serde_json::from_str(jar.get(STATE_COOKIE)?.value()).ok()?;
    let verifier = jar.get(PKCE_COOKIE)?.value().to_string();
    Some(AuthSession {
        state: pending.state,
        pkce_verifier: verifier,
        created_at: pending.created_at,
        expires_at: pending.expires_at,
    })
}

pub fn clear_pending(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(removal(STATE_COOKIE)).remove(removal(PKCE_COOKIE))
}

/// Writes the pair: the access cookie lives as long as the token, the
/// refresh cookie for thirty days.
pub fn store_tokens(jar: PrivateCookieJar, pair: &TokenPair, secure: bool) -> PrivateCookieJar {
    let access = AccessCookie {
        access_token: pair.access_token.clone(),
        expires_at: pair.access_expires_at,
        scope: pair.scope.clone(),
    };
    let jar = match serde_json::to_string(&access) {
        Ok(value) => {
            let ttl = Duration::seconds(pair.access_ttl_secs(Utc::now()).max(1));
            jar.add(cookie(ACCESS_COOKIE, value, ttl, secure))
        }
        Err(e) => {
            tracing::error!(error = %e, "Cannot encode access cookie");
            jar
        }
    };

    match &pair.refresh_token {
        Some(rt) => jar.add(cookie(
            REFRESH_COOKIE,
            rt.clone(),
            Duration::days(REFRESH_TTL_DAYS),
            secure,
        )),
        None => jar.remove(removal(REFRESH_COOKIE)),
    }
}

pub fn clear_tokens(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(removal(ACCESS_COOKIE)).remove(removal(REFRESH_COOKIE))
}

/// Rebuilds the pair from the cookies.
///
/// The access cookie expires with the token, so a lone refresh cookie is
/// the normal state of a returning browser. It yields a pair with an empty
/// access token that the first [`TokenManager::get_valid_token`] refreshes.
pub fn read_tokens(jar: &PrivateCookieJar) -> Option<TokenPair> {
    let access: Option<AccessCookie> = jar
        .get(ACCESS_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok());
    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    match (access, refresh_token) {
        (None, None) => None,
        (Some(a), refresh_token) => Some(TokenPair {
            access_token: a.access_token,
            access_expires_at: a.expires_at,
            refresh_token,
            scope: a.scope,
        }),
        (None, Some(rt)) => Some(TokenPair {
            access_token: String::new(),
            access_expires_at: DateTime::<Utc>::UNIX_EPOCH,
            refresh_token: Some(rt),
            scope: BTreeSet::new(),
        }),
    }
}

/// The caller's token store, extracted from the request cookies.
///
/// Extraction never fails: a browser without cookies gets an empty store and
/// the handler decides whether that is an error. Handlers hand the session
/// back through [`Session::settle`] so that a refreshed or cleared pair is
/// written into their own response.
pub struct Session {
    jar: PrivateCookieJar,
    pub tokens: TokenManager,
    secure: bool,
}

impl FromRequestParts<AppState> for Session {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> = PrivateCookieJar::from_request_parts(parts, state).await?;
        let tokens = TokenManager::new(read_tokens(&jar), state.refresher.clone());
        Ok(Session {
            jar,
            tokens,
            secure: state.secure_cookies,
        })
    }
}

impl Session {
    /// Finishes the request: drops the pair if Spotify rejected the token,
    /// then returns the jar carrying whatever changed.
    pub async fn settle<T>(
        self,
        result: Result<T, AppError>,
    ) -> (PrivateCookieJar, Result<T, AppError>) {
        if matches!(result, Err(AppError::Unauthenticated)) {
            self.tokens.clear().await;
        }

        let (pair, changed) = self.tokens.snapshot().await;
        let jar = match (changed, pair) {
            (false, _) => self.jar,
            (true, Some(pair)) => store_tokens(self.jar, &pair, self.secure),
            (true, None) => clear_tokens(self.jar),
        };
        (jar, result)
    }
}

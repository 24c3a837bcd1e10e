use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;
use serde::Deserialize;

use crate::{error::AppError, types::UserProfile};

use super::{
    AppState,
    client::ClientIp,
    session::{self, Session},
};

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// `GET /api/auth/login`
///
/// Starts a fresh login and sends the browser to the authorize page.
pub async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    let (pending, url) = state.flow.begin_login(Utc::now());
    let jar = session::store_pending(jar, &pending, state.secure_cookies);
    tracing::debug!("Login started");
    (jar, Redirect::to(url.as_str()))
}

/// `GET /api/auth/callback`
///
/// The pending login is dropped whatever the outcome, so a callback URL can
/// only be used once. Failures land on the frontend with an `error` tag.
pub async fn callback(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> (PrivateCookieJar, Redirect) {
    if let Some(error) = &params.error {
        tracing::info!(error = %error, "Authorization denied by user or provider");
    }

    let pending = session::read_pending(&jar);
    let jar = session::clear_pending(jar);

    let result = state
        .flow
        .complete_callback(
            pending,
            params.code.as_deref(),
            params.state.as_deref(),
            Utc::now(),
        )
        .await;

    match result {
        Ok(pair) => {
            tracing::info!("Login completed");
            let jar = session::store_tokens(jar, &pair, state.secure_cookies);
            (jar, Redirect::to(&format!("{}app", state.frontend_url)))
        }
        Err(e) => {
            tracing::warn!(kind = e.kind(), "Login failed");
            (jar, login_error(&state.frontend_url, e.kind()))
        }
    }
}

/// `GET|POST /api/auth/logout`. Idempotent.
pub async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    let jar = session::clear_tokens(session::clear_pending(jar));
    (jar, Redirect::to(&state.frontend_url))
}

/// `GET /api/me`
pub async fn me(
    State(state): State<AppState>,
    client: ClientIp,
    session: Session,
) -> (PrivateCookieJar, Result<Json<UserProfile>, AppError>) {
    let result = current_user(&state, &client, &session).await;
    session.settle(result.map(Json)).await
}

async fn current_user(
    state: &AppState,
    client: &ClientIp,
    session: &Session,
) -> Result<UserProfile, AppError> {
    client.throttle(state, "me").await?;
    let token = session.tokens.require_token().await?;
    let mut profile = state.music.me(&token).await?;
    if profile.country.is_none() {
        profile.country = Some(state.default_market.clone());
    }
    Ok(profile)
}

fn login_error(frontend: &str, kind: &str) -> Redirect {
    Redirect::to(&format!("{frontend}?error={}", urlencoding::encode(kind)))
}

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;

use crate::{
    error::AppError,
    pipeline::{GeneratedPlaylist, PublishRequest},
    types::PublishedPlaylist,
};

use super::{AppState, client::ClientIp, session::Session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, alias = "approxN")]
    pub approx_count: Option<u32>,
}

/// `POST /api/playlist/generate`
pub async fn generate(
    State(state): State<AppState>,
    client: ClientIp,
    session: Session,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> (PrivateCookieJar, Result<Json<GeneratedPlaylist>, AppError>) {
    let result = run_generate(&state, &client, &session, body).await;
    session.settle(result.map(Json)).await
}

async fn run_generate(
    state: &AppState,
    client: &ClientIp,
    session: &Session,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<GeneratedPlaylist, AppError> {
    client.throttle(state, "generate").await?;

    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let token = session.tokens.require_token().await?;
    state
        .generator
        .generate(&token, &request.prompt, request.approx_count)
        .await
}

/// `POST /api/playlist/publish`
pub async fn publish(
    State(state): State<AppState>,
    client: ClientIp,
    session: Session,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> (PrivateCookieJar, Result<Json<PublishedPlaylist>, AppError>) {
    let result = run_publish(&state, &client, &session, body).await;
    session.settle(result.map(Json)).await
}

async fn run_publish(
    state: &AppState,
    client: &ClientIp,
    session: &Session,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<PublishedPlaylist, AppError> {
    client.throttle(state, "publish").await?;
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let token = session.tokens.require_token().await?;
    state.publisher.publish(&token, &request).await
}

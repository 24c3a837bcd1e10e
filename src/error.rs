//! Error taxonomy shared by the auth flow, the generation pipeline and the
//! HTTP layer.
//!
//! Every fallible library operation returns [`AppError`]. At the HTTP
//! boundary it renders as `{ errorKind, detail, hint }` with a status that
//! tells the caller whether to rephrase, log in again, back off or give up.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Returned `state` did not match the pending login.
    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Authorization code missing from callback")]
    MissingCode,

    /// Token endpoint rejected the grant. The upstream body is logged, never returned.
    #[error("Token exchange failed")]
    TokenExchangeFailed,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("No plan provider is configured")]
    NoProviderConfigured,

    #[error("Every plan provider failed")]
    AllProvidersFailed,

    #[error("No usable seeds could be resolved from the prompt")]
    NoSeeds,

    #[error("No tracks left after filtering")]
    NoResults,

    #[error("Upstream request failed with status {status}")]
    UpstreamHttpError { status: u16 },

    #[error("No tracks to publish")]
    NoTracks,

    /// Playlist exists but appending a batch failed; nothing is rolled back.
    #[error("Playlist {playlist_id} created but adding tracks failed with status {status}")]
    PublishIncomplete { playlist_id: String, status: u16 },

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    /// Stable identifier used as `errorKind` in JSON bodies and as the
    /// `error` query value on the login landing page.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateMismatch => "StateMismatch",
            Self::MissingCode => "MissingCode",
            Self::TokenExchangeFailed => "TokenExchangeFailed",
            Self::Unauthenticated => "Unauthenticated",
            Self::NoProviderConfigured => "NoProviderConfigured",
            Self::AllProvidersFailed => "AllProvidersFailed",
            Self::NoSeeds => "NoSeeds",
            Self::NoResults => "NoResults",
            Self::UpstreamHttpError { .. } | Self::Http(_) => "UpstreamHttpError",
            Self::NoTracks => "NoTracks",
            Self::PublishIncomplete { .. } => "PublishIncomplete",
            Self::RateLimited { .. } => "RateLimited",
            Self::BadRequest(_) => "BadRequest",
            Self::Config(_) => "Config",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::NoTracks | Self::StateMismatch | Self::MissingCode => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NoSeeds | Self::NoResults => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NoProviderConfigured => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the caller should do next.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::NoSeeds | Self::NoResults => "rephrase_prompt",
            Self::Unauthenticated
            | Self::TokenExchangeFailed
            | Self::StateMismatch
            | Self::MissingCode => "login_again",
            Self::RateLimited { .. } => "retry_after_backoff",
            Self::UpstreamHttpError { status } if *status == 429 || *status >= 500 => {
                "retry_after_backoff"
            }
            Self::NoProviderConfigured | Self::Config(_) => "contact_admin",
            _ => "none",
        }
    }

    /// Upstream status, if this error carries one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamHttpError { status } | Self::PublishIncomplete { status, .. } => {
                Some(*status)
            }
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        let mut body = json!({
            "errorKind": self.kind(),
            "detail": self.to_string(),
            "hint": self.hint(),
        });
        if let Some(upstream) = self.upstream_status() {
            body["status"] = json!(upstream);
        }
        if let Self::PublishIncomplete { playlist_id, .. } = &self {
            body["playlistId"] = json!(playlist_id);
        }

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

//! # Spotify Integration Module
//!
//! This module is the only place that speaks HTTP to Spotify. Everything above
//! it (token store, seed resolver, aggregator, publisher) depends on the two
//! capabilities defined here instead of on `reqwest` directly:
//!
//! - [`TokenEndpoint`] - authorization-code and refresh-token grants
//! - [`MusicService`] - bearer-authenticated Web API calls
//!
//! [`SpotifyClient`] implements both against the real endpoints. Tests supply
//! in-memory fakes.
//!
//! ## Layout
//!
//! ```text
//! Pipeline / Management
//!          ↓
//! MusicService + TokenEndpoint (traits)
//!          ↓
//! SpotifyClient
//!     ├── auth      (token endpoint, authorize URL)
//!     ├── search    (search, genre seeds, recommendations, artist genres)
//!     └── playlist  (profile, create playlist, add tracks)
//!          ↓
//! Spotify Web API
//! ```
//!
//! ## Error mapping
//!
//! Non-2xx responses become [`AppError::UpstreamHttpError`] carrying the
//! status, except 401 which means the bearer token is no longer accepted and
//! maps to [`AppError::Unauthenticated`]. Nothing is retried here; 429 and
//! 5xx are surfaced so that callers decide on backoff.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::{
    config::SpotifySettings,
    error::AppError,
    types::{
        ArtistSummary, CreatePlaylistRequest, PublishedPlaylist, RecommendationQuery, TokenGrant,
        Track, UserProfile,
    },
};

pub mod auth;
pub mod playlist;
pub mod search;

/// OAuth token endpoint grants.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges an authorization code plus the PKCE verifier for tokens.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant, AppError>;

    /// Trades a refresh token for a new access token (and possibly a rotated refresh token).
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;
}

/// Bearer-authenticated music catalog and library operations.
#[async_trait]
pub trait MusicService: Send + Sync {
    async fn search_artists(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<ArtistSummary>, AppError>;

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
        market: Option<&str>,
    ) -> Result<Vec<Track>, AppError>;

    /// Genre vocabulary the recommendations endpoint accepts as seeds.
    async fn allowed_genres(&self, token: &str) -> Result<Vec<String>, AppError>;

    async fn recommendations(
        &self,
        token: &str,
        query: &RecommendationQuery,
    ) -> Result<Vec<Track>, AppError>;

    /// Genre tags per artist ID. Unknown IDs are simply absent from the map.
    async fn artist_genres(
        &self,
        token: &str,
        artist_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, AppError>;

    async fn me(&self, token: &str) -> Result<UserProfile, AppError>;

    async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        request: &CreatePlaylistRequest,
    ) -> Result<PublishedPlaylist, AppError>;

    /// Appends at most 100 URIs to a playlist.
    async fn add_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), AppError>;
}

/// reqwest-backed client for the Spotify accounts service and Web API.
pub struct SpotifyClient {
    pub(crate) http: Client,
    pub(crate) settings: SpotifySettings,
}

impl SpotifyClient {
    #[must_use]
    pub fn new(settings: SpotifySettings) -> Self {
        Self {
            http: Client::new(),
            settings,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or timeouts).
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub(crate) fn api(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_url, path)
    }

    /// Checks the response status; returns the response on success or maps
    /// the failure into the crate's taxonomy.
    pub(crate) async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            operation,
            status = status.as_u16(),
            body = %body,
            "Spotify request failed"
        );

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::Unauthenticated);
        }
        Err(AppError::UpstreamHttpError {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl TokenEndpoint for SpotifyClient {
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant, AppError> {
        auth::exchange_code_pkce(self, code, verifier).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        auth::refresh_token(self, refresh_token).await
    }
}

#[async_trait]
impl MusicService for SpotifyClient {
    async fn search_artists(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<ArtistSummary>, AppError> {
        search::artists(self, token, query, limit).await
    }

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
        market: Option<&str>,
    ) -> Result<Vec<Track>, AppError> {
        search::tracks(self, token, query, limit, market).await
    }

    async fn allowed_genres(&self, token: &str) -> Result<Vec<String>, AppError> {
        search::available_genre_seeds(self, token).await
    }

    async fn recommendations(
        &self,
        token: &str,
        query: &RecommendationQuery,
    ) -> Result<Vec<Track>, AppError> {
        search::recommendations(self, token, query).await
    }

    async fn artist_genres(
        &self,
        token: &str,
        artist_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, AppError> {
        search::artist_genres(self, token, artist_ids).await
    }

    async fn me(&self, token: &str) -> Result<UserProfile, AppError> {
        playlist::me(self, token).await
    }

    async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        request: &CreatePlaylistRequest,
    ) -> Result<PublishedPlaylist, AppError> {
        playlist::create(self, token, user_id, request).await
    }

    async fn add_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), AppError> {
        playlist::add_tracks(self, token, playlist_id, uris).await
    }
}

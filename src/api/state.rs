use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use reqwest::Client;

use crate::{
    config::Settings,
    management::{AuthFlow, FixedWindowLimiter, RateLimiter, RefreshCoordinator},
    pipeline::{PlaylistGenerator, Publisher},
    planner::Planner,
    preview::PreviewResolver,
    spotify::{MusicService, SpotifyClient, TokenEndpoint},
};

/// Shared handler state.
///
/// Everything in here is read-only or internally synchronised; the only
/// per-user state travels in the encrypted cookies.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthFlow>,
    pub refresher: Arc<RefreshCoordinator>,
    pub music: Arc<dyn MusicService>,
    pub generator: Arc<PlaylistGenerator>,
    pub publisher: Arc<Publisher>,
    pub planner: Arc<Planner>,
    pub limiter: Arc<dyn RateLimiter>,
    pub cookie_key: Key,
    pub secure_cookies: bool,
    pub frontend_url: String,
    pub default_market: String,
}

impl AppState {
    /// Wires the real Spotify client, LLM planners and preview catalogs.
    pub fn from_settings(settings: &Settings) -> Self {
        let http = Client::new();
        let spotify = Arc::new(
            SpotifyClient::new(settings.spotify.clone()).with_http_client(http.clone()),
        );
        let planner = Planner::from_settings(&settings.planner, http.clone());
        let previews = PreviewResolver::with_default_catalogs(
            http,
            &settings.spotify.market,
            settings.pipeline.lookup_concurrency,
        );

        Self::new(
            settings,
            spotify.clone(),
            spotify,
            Arc::new(planner),
            Arc::new(previews),
            Arc::new(FixedWindowLimiter::per_minute(settings.rate_limit_per_minute)),
        )
    }

    /// Assembles the state from explicit collaborators.
    pub fn new(
        settings: &Settings,
        endpoint: Arc<dyn TokenEndpoint>,
        music: Arc<dyn MusicService>,
        planner: Arc<Planner>,
        previews: Arc<PreviewResolver>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let generator = PlaylistGenerator::new(
            music.clone(),
            planner.clone(),
            previews,
            settings.pipeline.clone(),
            settings.spotify.market.clone(),
        );

        Self {
            flow: Arc::new(AuthFlow::new(settings.spotify.clone(), endpoint.clone())),
            refresher: Arc::new(RefreshCoordinator::new(endpoint)),
            generator: Arc::new(generator),
            publisher: Arc::new(Publisher::new(music.clone())),
            music,
            planner,
            limiter,
            cookie_key: settings.cookie_key.clone(),
            secure_cookies: settings.secure_cookies,
            frontend_url: settings.frontend_url.clone(),
            default_market: settings.spotify.market.clone(),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum_extra::extract::cookie::Key;
use moodmix::{
    AppError,
    config::{
        GenreExclusion, LlmSettings, PipelineSettings, PlanFallback, PlannerSettings, Settings,
        SpotifySettings,
    },
    planner::{PlanError, PlanProvider, plan_from_text},
    preview::PreviewCatalog,
    spotify::{MusicService, TokenEndpoint},
    types::{
        ArtistSummary, CreatePlaylistRequest, Plan, PublishedPlaylist, RecommendationQuery,
        TokenGrant, Track, UserProfile,
    },
};

pub fn track(id: &str, artist: &str, name: &str) -> Track {
    Track {
        id: id.to_string(),
        uri: format!("spotify:track:{id}"),
        name: name.to_string(),
        artist_names: vec![artist.to_string()],
        artist_ids: vec![format!("artist-{}", artist.to_lowercase().replace(' ', "-"))],
        album_cover_url: None,
        preview_url: None,
        duration_ms: 180_000,
        explicit: false,
    }
}

/// `count` tracks spread round-robin over `artists`.
pub fn round_robin(prefix: &str, artists: &[&str], count: usize) -> Vec<Track> {
    (0..count)
        .map(|i| {
            let artist = artists[i % artists.len()];
            track(&format!("{prefix}{i}"), artist, &format!("Song {i}"))
        })
        .collect()
}

pub fn spotify_settings() -> SpotifySettings {
    SpotifySettings {
        client_id: "client-id".into(),
        client_secret: None,
        redirect_uri: "http://127.0.0.1:8080/api/auth/callback".parse().unwrap(),
        auth_url: "https://accounts.example.com/authorize".parse().unwrap(),
        token_url: "https://accounts.example.com/api/token".parse().unwrap(),
        api_url: "https://api.example.com/v1".into(),
        scopes: vec!["user-read-email".into(), "playlist-modify-private".into()],
        market: "FR".into(),
    }
}

pub fn settings() -> Settings {
    Settings {
        server_addr: "127.0.0.1:0".into(),
        frontend_url: "/".into(),
        cookie_key: Key::generate(),
        secure_cookies: false,
        rate_limit_per_minute: 60,
        spotify: spotify_settings(),
        planner: PlannerSettings {
            order: Vec::new(),
            fallback: PlanFallback::Heuristic,
            llm: LlmSettings::default(),
        },
        pipeline: PipelineSettings {
            overfetch_factor: 2,
            genre_exclusion: GenreExclusion::Lookup,
            lookup_concurrency: 4,
        },
    }
}

pub fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        token_type: Some("Bearer".into()),
        expires_in: Some(3600),
        refresh_token: refresh.map(String::from),
        scope: Some("user-read-email playlist-modify-private".into()),
    }
}

/// Token endpoint that counts calls and mints `at-<n>` access tokens.
#[derive(Default)]
pub struct FakeTokenEndpoint {
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub fail: bool,
    /// Refresh answers 503 instead of rejecting the grant.
    pub unavailable: bool,
    pub delay: Duration,
}

impl FakeTokenEndpoint {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn exchange_code(&self, code: &str, _verifier: &str) -> Result<TokenGrant, AppError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.fail || code == "bad-code" {
            return Err(AppError::UpstreamHttpError { status: 400 });
        }
        Ok(grant("at-login", Some("rt-login")))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, AppError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(AppError::TokenExchangeFailed);
        }
        if self.unavailable {
            return Err(AppError::UpstreamHttpError { status: 503 });
        }
        Ok(grant(&format!("at-{n}"), None))
    }
}

/// In-memory catalog with call counters.
pub struct FakeMusic {
    pub artists: Vec<ArtistSummary>,
    pub genres: Vec<String>,
    pub recommendations: Vec<Track>,
    pub search: Vec<Track>,
    pub artist_genres: HashMap<String, Vec<String>>,
    pub profile: UserProfile,
    /// Zero-based index of the `add_tracks` call that fails with 502.
    pub fail_add_at: Option<usize>,
    pub recommendation_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub genre_lookup_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub added: Mutex<Vec<Vec<String>>>,
    pub last_query: Mutex<Option<RecommendationQuery>>,
}

impl Default for FakeMusic {
    fn default() -> Self {
        Self {
            artists: Vec::new(),
            genres: vec!["funk".into(), "disco".into(), "soul".into(), "hip-hop".into()],
            recommendations: Vec::new(),
            search: Vec::new(),
            artist_genres: HashMap::new(),
            profile: UserProfile {
                id: "user-1".into(),
                display_name: "Test User".into(),
                country: Some("BE".into()),
                avatar_url: None,
            },
            fail_add_at: None,
            recommendation_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            genre_lookup_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
            added: Mutex::new(Vec::new()),
            last_query: Mutex::new(None),
        }
    }
}

impl FakeMusic {
    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Every call made to the service, whatever the endpoint.
    pub fn total_calls(&self) -> usize {
        [
            &self.recommendation_calls,
            &self.search_calls,
            &self.genre_lookup_calls,
            &self.me_calls,
            &self.create_calls,
            &self.add_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

#[async_trait]
impl MusicService for FakeMusic {
    async fn search_artists(
        &self,
        _token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<ArtistSummary>, AppError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .artists
            .iter()
            .filter(|a| a.name.eq_ignore_ascii_case(query.trim()))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn search_tracks(
        &self,
        _token: &str,
        _query: &str,
        limit: u32,
        _market: Option<&str>,
    ) -> Result<Vec<Track>, AppError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.search.iter().take(limit as usize).cloned().collect())
    }

    async fn allowed_genres(&self, _token: &str) -> Result<Vec<String>, AppError> {
        Ok(self.genres.clone())
    }

    async fn recommendations(
        &self,
        _token: &str,
        query: &RecommendationQuery,
    ) -> Result<Vec<Track>, AppError> {
        self.recommendation_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());
        Ok(self
            .recommendations
            .iter()
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn artist_genres(
        &self,
        _token: &str,
        artist_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, AppError> {
        self.genre_lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(artist_ids
            .iter()
            .filter_map(|id| self.artist_genres.get(id).map(|g| (id.clone(), g.clone())))
            .collect())
    }

    async fn me(&self, token: &str) -> Result<UserProfile, AppError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        if token == "revoked" {
            return Err(AppError::Unauthenticated);
        }
        Ok(self.profile.clone())
    }

    async fn create_playlist(
        &self,
        _token: &str,
        _user_id: &str,
        _request: &CreatePlaylistRequest,
    ) -> Result<PublishedPlaylist, AppError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PublishedPlaylist {
            playlist_id: "pl-1".into(),
            external_url: "https://open.spotify.com/playlist/pl-1".into(),
        })
    }

    async fn add_tracks(
        &self,
        _token: &str,
        _playlist_id: &str,
        uris: &[String],
    ) -> Result<(), AppError> {
        let call = self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_add_at == Some(call) {
            return Err(AppError::UpstreamHttpError { status: 502 });
        }
        self.added.lock().unwrap().push(uris.to_vec());
        Ok(())
    }
}

/// Plan provider returning a canned plan, or failing when there is none.
pub struct FakePlanProvider {
    pub plan: Option<Plan>,
    pub configured: bool,
    pub calls: Arc<AtomicUsize>,
}

impl FakePlanProvider {
    pub fn from_json(json: &str) -> Self {
        Self {
            plan: Some(plan_from_text(json, None).unwrap()),
            configured: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            plan: None,
            configured: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::failing()
        }
    }
}

#[async_trait]
impl PlanProvider for FakePlanProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn propose(&self, _prompt: &str, _approx_count: Option<u32>) -> Result<Plan, PlanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.plan.clone().ok_or(PlanError::Status(500))
    }
}

/// Preview catalog that always knows a preview and counts lookups.
pub struct CountingCatalog {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PreviewCatalog for CountingCatalog {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn find_preview(&self, artist: &str, title: &str) -> Result<Option<String>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!(
            "https://previews.example.com/{}/{}.mp3",
            urlencoding::encode(artist),
            urlencoding::encode(title)
        )))
    }
}

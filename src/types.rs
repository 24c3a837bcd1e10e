use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Access tokens this close to expiry are treated as already expired.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Pending login: one-shot, short-lived binding between the authorize
/// redirect and the callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub state: String,
    pub pkce_verifier: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Raw token-endpoint response for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub scope: BTreeSet<String>,
}

impl TokenPair {
    /// Builds a pair from a fresh grant.
    ///
    /// `previous_refresh` is kept when the grant does not rotate the refresh
    /// token; a newly issued one always replaces it.
    pub fn from_grant(
        grant: TokenGrant,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_in = grant.expires_in.unwrap_or(3600).max(0);
        Self {
            access_token: grant.access_token,
            access_expires_at: now + Duration::seconds(expires_in),
            refresh_token: grant
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh),
            scope: grant
                .scope
                .unwrap_or_default()
                .split_whitespace()
                .map(String::from)
                .collect(),
        }
    }

    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && now + Duration::seconds(EXPIRY_SKEW_SECS) < self.access_expires_at
    }

    /// Seconds the access cookie should live.
    pub fn access_ttl_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.access_expires_at - now).num_seconds().max(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Popularity {
    Mainstream,
    Niche,
    #[default]
    Mixed,
}

/// Structured intent derived from a prompt. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub target_count: u32,
    pub include_artists: Vec<String>,
    pub include_genres: Vec<String>,
    pub include_tracks: Vec<String>,
    pub keywords: Vec<String>,
    pub exclude_artists: BTreeSet<String>,
    pub exclude_genres: BTreeSet<String>,
    pub exclude_tracks: BTreeSet<String>,
    pub popularity: Popularity,
}

impl Plan {
    /// A plan with nothing to search for is treated as a provider failure.
    pub fn is_empty(&self) -> bool {
        self.include_artists.is_empty()
            && self.include_genres.is_empty()
            && self.include_tracks.is_empty()
            && self.keywords.is_empty()
    }

    pub fn exclusions(&self) -> Exclusions {
        Exclusions {
            artists: self.exclude_artists.clone(),
            genres: self.exclude_genres.clone(),
            tracks: self.exclude_tracks.clone(),
        }
    }
}

/// Normalised (lowercased, trimmed) exclusion sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    pub artists: BTreeSet<String>,
    pub genres: BTreeSet<String>,
    pub tracks: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSet {
    pub artist_ids: Vec<String>,
    pub genre_ids: Vec<String>,
    pub track_ids: Vec<String>,
}

impl SeedSet {
    pub const MAX_PER_KIND: usize = 5;

    pub fn total(&self) -> usize {
        self.artist_ids.len() + self.genre_ids.len() + self.track_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Parameters for one recommendations call.
#[derive(Debug, Clone, Default)]
pub struct RecommendationQuery {
    pub seeds: SeedSet,
    pub limit: u32,
    pub market: Option<String>,
    pub min_popularity: Option<u32>,
    pub max_popularity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artist_names: Vec<String>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub artist_ids: Vec<String>,
    pub album_cover_url: Option<String>,
    pub preview_url: Option<String>,
    pub duration_ms: u64,
    pub explicit: bool,
}

impl Track {
    pub fn primary_artist(&self) -> &str {
        self.artist_names.first().map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: String,
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedPlaylist {
    pub playlist_id: String,
    pub external_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTrackToPlaylistRequest {
    pub uris: Vec<String>,
}

#[derive(Tabled)]
pub struct PlanTableRow {
    pub field: String,
    pub values: String,
}

// ── Spotify wire types ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub artists: Option<Paging<ArtistObject>>,
    #[serde(default)]
    pub tracks: Option<Paging<TrackObject>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeveralArtistsResponse {
    #[serde(default)]
    pub artists: Vec<Option<ArtistObject>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimpleArtist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumObject {
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    #[serde(default)]
    pub album: Option<AlbumObject>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub explicit: bool,
}

impl TrackObject {
    /// Tracks without an ID (local files, region-locked stubs) are dropped.
    pub fn into_track(self) -> Option<Track> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let album_cover_url = self.album.and_then(|a| {
            // second image is the mid-size cover
            a.images
                .get(1)
                .or_else(|| a.images.first())
                .map(|i| i.url.clone())
        });
        Some(Track {
            uri: if self.uri.is_empty() {
                format!("spotify:track:{id}")
            } else {
                self.uri
            },
            id,
            name: self.name,
            artist_names: self.artists.iter().map(|a| a.name.clone()).collect(),
            artist_ids: self.artists.into_iter().filter_map(|a| a.id).collect(),
            album_cover_url,
            preview_url: self.preview_url.filter(|u| !u.is_empty()),
            duration_ms: self.duration_ms,
            explicit: self.explicit,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationsResponse {
    #[serde(default)]
    pub tracks: Vec<TrackObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenreSeedsResponse {
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlaylistResponse {
    pub id: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

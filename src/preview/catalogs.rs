use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{error::AppError, utils::sanitize_query};

const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";
const DEEZER_SEARCH_URL: &str = "https://api.deezer.com/search";

/// An external catalog that can be searched for a 30 s preview.
#[async_trait]
pub trait PreviewCatalog: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find_preview(&self, artist: &str, title: &str) -> Result<Option<String>, AppError>;
}

#[derive(Deserialize)]
struct ItunesResponse {
    #[serde(default)]
    results: Vec<ItunesResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesResult {
    #[serde(default)]
    artist_name: String,
    #[serde(default)]
    track_name: String,
    #[serde(default)]
    preview_url: Option<String>,
}

/// iTunes Search API. No key needed.
pub struct ItunesCatalog {
    http: Client,
    url: String,
    country: String,
}

impl ItunesCatalog {
    pub fn new(http: Client, country: impl Into<String>) -> Self {
        Self {
            http,
            url: ITUNES_SEARCH_URL.to_string(),
            country: country.into(),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl PreviewCatalog for ItunesCatalog {
    fn name(&self) -> &'static str {
        "itunes"
    }

    async fn find_preview(&self, artist: &str, title: &str) -> Result<Option<String>, AppError> {
        let term = format!("{} {}", sanitize_query(artist), sanitize_query(title));
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("term", term.as_str()),
                ("entity", "song"),
                ("limit", "5"),
                ("country", self.country.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::UpstreamHttpError {
                status: response.status().as_u16(),
            });
        }

        let body = response.json::<ItunesResponse>().await?;
        Ok(best_itunes_match(body.results, artist, title))
    }
}

/// Prefers a result whose artist and title both look like the wanted ones,
/// then any result with a preview.
fn best_itunes_match(results: Vec<ItunesResult>, artist: &str, title: &str) -> Option<String> {
    let want_artist = artist.to_lowercase();
    let want_title = title.to_lowercase();
    let loosely_equal = |a: &str, b: &str| !a.is_empty() && (a.contains(b) || b.contains(a));

    let mut first = None;
    for result in results {
        let Some(url) = result.preview_url.filter(|u| !u.is_empty()) else {
            continue;
        };
        let artist_ok = loosely_equal(&result.artist_name.to_lowercase(), &want_artist);
        let title_ok = loosely_equal(&result.track_name.to_lowercase(), &want_title);
        if artist_ok && title_ok {
            return Some(url);
        }
        first.get_or_insert(url);
    }
    first
}

#[derive(Deserialize)]
struct DeezerResponse {
    #[serde(default)]
    data: Vec<DeezerTrack>,
}

#[derive(Deserialize)]
struct DeezerTrack {
    #[serde(default)]
    preview: Option<String>,
}

/// Deezer public search API.
pub struct DeezerCatalog {
    http: Client,
    url: String,
}

impl DeezerCatalog {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            url: DEEZER_SEARCH_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl PreviewCatalog for DeezerCatalog {
    fn name(&self) -> &'static str {
        "deezer"
    }

    async fn find_preview(&self, artist: &str, title: &str) -> Result<Option<String>, AppError> {
        let query = format!(
            "artist:\"{}\" track:\"{}\"",
            sanitize_query(artist),
            sanitize_query(title)
        );
        let response = self
            .http
            .get(&self.url)
            .query(&[("q", query.as_str()), ("limit", "5")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::UpstreamHttpError {
                status: response.status().as_u16(),
            });
        }

        let body = response.json::<DeezerResponse>().await?;
        Ok(body
            .data
            .into_iter()
            .find_map(|t| t.preview.filter(|p| !p.is_empty())))
    }
}

use std::collections::HashMap;

use crate::{
    error::AppError,
    types::{
        ArtistSummary, GenreSeedsResponse, RecommendationQuery, RecommendationsResponse,
        SearchResponse, SeveralArtistsResponse, Track,
    },
};

use super::SpotifyClient;

/// `GET /artists?ids=` accepts at most 50 IDs per call.
const ARTISTS_BATCH: usize = 50;

/// Searches artists by name, best match first.
pub async fn artists(
    client: &SpotifyClient,
    token: &str,
    query: &str,
    limit: u32,
) -> Result<Vec<ArtistSummary>, AppError> {
    let limit = limit.clamp(1, 50).to_string();
    let response = client
        .http
        .get(client.api("/search"))
        .bearer_auth(token)
        .query(&[("type", "artist"), ("q", query), ("limit", limit.as_str())])
        .send()
        .await?;

    let res = SpotifyClient::ensure_success(response, "artist search")
        .await?
        .json::<SearchResponse>()
        .await?;

    Ok(res
        .artists
        .map(|page| page.items)
        .unwrap_or_default()
        .into_iter()
        .map(|a| ArtistSummary {
            id: a.id,
            name: a.name,
        })
        .collect())
}

/// Searches tracks by free text.
pub async fn tracks(
    client: &SpotifyClient,
    token: &str,
    query: &str,
    limit: u32,
    market: Option<&str>,
) -> Result<Vec<Track>, AppError> {
    let limit = limit.clamp(1, 50).to_string();
    let mut params = vec![("type", "track"), ("q", query), ("limit", limit.as_str())];
    if let Some(market) = market {
        params.push(("market", market));
    }

    let response = client
        .http
        .get(client.api("/search"))
        .bearer_auth(token)
        .query(&params)
        .send()
        .await?;

    let res = SpotifyClient::ensure_success(response, "track search")
        .await?
        .json::<SearchResponse>()
        .await?;

    Ok(res
        .tracks
        .map(|page| page.items)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| t.into_track())
        .collect())
}

pub async fn available_genre_seeds(
    client: &SpotifyClient,
    token: &str,
) -> Result<Vec<String>, AppError> {
    let response = client
        .http
        .get(client.api("/recommendations/available-genre-seeds"))
        .bearer_auth(token)
        .send()
        .await?;

    let res = SpotifyClient::ensure_success(response, "genre seeds")
        .await?
        .json::<GenreSeedsResponse>()
        .await?;
    Ok(res.genres)
}

/// Calls the recommendations endpoint.
///
/// Each seed list is capped at five values and the limit at 100, the
/// endpoint's hard maxima. An empty seed set is refused locally because the
/// endpoint only answers it with an unhelpful 400.
pub async fn recommendations(
    client: &SpotifyClient,
    token: &str,
    query: &RecommendationQuery,
) -> Result<Vec<Track>, AppError> {
    if query.seeds.is_empty() {
        return Err(AppError::NoSeeds);
    }

    let mut params: Vec<(&str, String)> = vec![("limit", query.limit.clamp(1, 100).to_string())];
    let seeds = [
        ("seed_artists", &query.seeds.artist_ids),
        ("seed_genres", &query.seeds.genre_ids),
        ("seed_tracks", &query.seeds.track_ids),
    ];
    for (name, values) in seeds {
        if !values.is_empty() {
            params.push((name, join_first(values, 5)));
        }
    }
    if let Some(market) = &query.market {
        params.push(("market", market.clone()));
    }
    if let Some(min) = query.min_popularity {
        params.push(("min_popularity", min.to_string()));
    }
    if let Some(max) = query.max_popularity {
        params.push(("max_popularity", max.to_string()));
    }

    let response = client
        .http
        .get(client.api("/recommendations"))
        .bearer_auth(token)
        .query(&params)
        .send()
        .await?;

    let res = SpotifyClient::ensure_success(response, "recommendations")
        .await?
        .json::<RecommendationsResponse>()
        .await?;

    Ok(res
        .tracks
        .into_iter()
        .filter_map(|t| t.into_track())
        .collect())
}

/// Fetches genre tags for the given artists in batches of 50.
pub async fn artist_genres(
    client: &SpotifyClient,
    token: &str,
    artist_ids: &[String],
) -> Result<HashMap<String, Vec<String>>, AppError> {
    let mut genres = HashMap::new();

    for chunk in artist_ids.chunks(ARTISTS_BATCH) {
        let ids = chunk.join(",");
        let response = client
            .http
            .get(client.api("/artists"))
            .bearer_auth(token)
            .query(&[("ids", ids.as_str())])
            .send()
            .await?;

        let res = SpotifyClient::ensure_success(response, "artist lookup")
            .await?
            .json::<SeveralArtistsResponse>()
            .await?;

        for artist in res.artists.into_iter().flatten() {
            genres.insert(artist.id, artist.genres);
        }
    }

    Ok(genres)
}

fn join_first(values: &[String], n: usize) -> String {
    values
        .iter()
        .take(n)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

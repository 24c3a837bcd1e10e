use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    config::{GenreExclusion, PipelineSettings},
    error::AppError,
    spotify::MusicService,
    types::{Exclusions, Plan, Popularity, RecommendationQuery, SeedSet, Track},
    utils::{contains_phrase, diversity_cap, normalize, remove_duplicate_tracks},
};

/// Allowed shortfall below the requested count before topping up.
pub const COUNT_TOLERANCE: usize = 2;

/// Popularity threshold that separates mainstream from niche.
const POPULARITY_SPLIT: u32 = 60;

/// Search endpoint page size.
const SEARCH_LIMIT: u32 = 50;

/// Turns seeds into the final track list.
pub struct Aggregator {
    music: Arc<dyn MusicService>,
    settings: PipelineSettings,
}

impl Aggregator {
    pub fn new(music: Arc<dyn MusicService>, settings: PipelineSettings) -> Self {
        Self { music, settings }
    }

    /// Fetch limit for the recommendations call.
    pub fn fetch_limit(&self, target: u32) -> u32 {
        (target.saturating_mul(self.settings.overfetch_factor.max(2))).clamp(1, 100)
    }

    /// Fetches recommendations and filters them down to `plan.target_count`.
    ///
    /// Pipeline: recommendations (keyword search if that came back empty),
    /// then ID dedup, artist/title exclusions, genre exclusions, per-artist
    /// diversity cap and truncation. If fewer than `target - 2` tracks survive
    /// and no search was made yet, one keyword search tops the pool up and
    /// the filters run again.
    ///
    /// # Errors
    ///
    /// [`AppError::NoResults`] when nothing survives filtering.
    pub async fn generate(
        &self,
        token: &str,
        seeds: &SeedSet,
        plan: &Plan,
        market: Option<&str>,
    ) -> Result<Vec<Track>, AppError> {
        if seeds.is_empty() {
            return Err(AppError::NoSeeds);
        }

        let target = plan.target_count.clamp(1, 100);
        let limit = self.fetch_limit(target);
        let (min_popularity, max_popularity) = match plan.popularity {
            Popularity::Mainstream => (Some(POPULARITY_SPLIT), None),
            Popularity::Niche => (None, Some(POPULARITY_SPLIT)),
            Popularity::Mixed => (None, None),
        };
        let query = RecommendationQuery {
            seeds: seeds.clone(),
            limit,
            market: market.map(String::from),
            min_popularity,
            max_popularity,
        };

        let mut pool = self.music.recommendations(token, &query).await?;
        let mut searched = false;
        if pool.is_empty() {
            tracing::info!("Recommendations came back empty, falling back to search");
            pool = self.keyword_search(token, plan, market, limit).await?;
            searched = true;
        }

        let exclusions = plan.exclusions();
        let mut genres = HashMap::new();
        let mut result = self
            .filter(token, pool.clone(), &exclusions, target, &mut genres)
            .await;

        if result.len() + COUNT_TOLERANCE < target as usize && !searched {
            tracing::debug!(have = result.len(), target, "Topping up with keyword search");
            match self.keyword_search(token, plan, market, limit).await {
                Ok(extra) => {
                    pool.extend(extra);
                    result = self
                        .filter(token, pool, &exclusions, target, &mut genres)
                        .await;
                }
                Err(e) => tracing::warn!(error = %e, "Top-up search failed"),
            }
        }

        if result.is_empty() {
            return Err(AppError::NoResults);
        }
        Ok(result)
    }

    async fn filter(
        &self,
        token: &str,
        mut tracks: Vec<Track>,
        exclusions: &Exclusions,
        target: u32,
        genres: &mut HashMap<String, Vec<String>>,
    ) -> Vec<Track> {
        remove_duplicate_tracks(&mut tracks);
        tracks.retain(|t| !is_excluded(t, exclusions));

        if !exclusions.genres.is_empty() {
            match self.settings.genre_exclusion {
                GenreExclusion::Lookup => {
                    if self.lookup_genres(token, &tracks, genres).await {
                        tracks.retain(|t| !has_excluded_genre(t, genres, &exclusions.genres));
                    }
                }
                GenreExclusion::Skip => {
                    tracing::debug!("Genre exclusions ignored, lookup disabled");
                }
            }
        }

        let mut result = apply_diversity_cap(tracks, diversity_cap(target));
        result.truncate(target as usize);
        result
    }

    /// Fills `genres` for every artist of `tracks` not looked up yet.
    /// Returns `false` when the lookup failed and the filter should be skipped.
    async fn lookup_genres(
        &self,
        token: &str,
        tracks: &[Track],
        genres: &mut HashMap<String, Vec<String>>,
    ) -> bool {
        let mut missing: Vec<String> = Vec::new();
        let mut queued = HashSet::new();
        for id in tracks.iter().flat_map(|t| t.artist_ids.iter()) {
            if !genres.contains_key(id) && queued.insert(id.clone()) {
                missing.push(id.clone());
            }
        }
        if missing.is_empty() {
            return true;
        }

        match self.music.artist_genres(token, &missing).await {
            Ok(found) => {
                for id in missing {
                    let tags = found.get(&id).cloned().unwrap_or_default();
                    genres.insert(id, tags);
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Artist genre lookup failed, genre exclusions skipped");
                false
            }
        }
    }

    /// Plain track search built from the plan: keywords first, then genres,
    /// then artist names. At most three queries.
    async fn keyword_search(
        &self,
        token: &str,
        plan: &Plan,
        market: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Track>, AppError> {
        let queries = search_queries(plan);
        let per_query = limit.min(SEARCH_LIMIT);
        let mut found = Vec::new();
        for query in queries {
            found.extend(
                self.music
                    .search_tracks(token, &query, per_query, market)
                    .await?,
            );
        }
        Ok(found)
    }
}

fn search_queries(plan: &Plan) -> Vec<String> {
    let queries: Vec<String> = if !plan.keywords.is_empty() {
        plan.keywords.clone()
    } else if !plan.include_genres.is_empty() {
        plan.include_genres
            .iter()
            .map(|g| format!("genre:\"{g}\""))
            .collect()
    } else {
        plan.include_artists.clone()
    };
    queries.into_iter().take(3).collect()
}

/// Name/title exclusion on normalised strings: exact or whole-word match.
pub fn is_excluded(track: &Track, exclusions: &Exclusions) -> bool {
    let artist_hit = track.artist_names.iter().any(|name| {
        let name = normalize(name);
        exclusions
            .artists
            .iter()
            .any(|ex| name == *ex || contains_phrase(&name, ex))
    });
    if artist_hit {
        return true;
    }

    let title = normalize(&track.name);
    exclusions
        .tracks
        .iter()
        .any(|ex| title == *ex || contains_phrase(&title, ex))
}

fn has_excluded_genre(
    track: &Track,
    genres: &HashMap<String, Vec<String>>,
    excluded: &std::collections::BTreeSet<String>,
) -> bool {
    track
        .artist_ids
        .iter()
        .filter_map(|id| genres.get(id))
        .flatten()
        .map(|tag| normalize(tag))
        .any(|tag| {
            excluded
                .iter()
                .any(|ex| tag == *ex || contains_phrase(&tag, ex))
        })
}

/// Keeps tracks in order while no credited artist exceeds `cap` occurrences.
pub fn apply_diversity_cap(tracks: Vec<Track>, cap: usize) -> Vec<Track> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(tracks.len());

    for track in tracks {
        let artists: HashSet<String> = track.artist_names.iter().map(|a| normalize(a)).collect();
        if artists
            .iter()
            .any(|a| counts.get(a).copied().unwrap_or(0) >= cap)
        {
            continue;
        }
        for artist in artists {
            *counts.entry(artist).or_default() += 1;
        }
        kept.push(track);
    }
    kept
}

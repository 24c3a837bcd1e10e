use std::{collections::HashSet, sync::Arc};

use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::{
    error::AppError,
    spotify::MusicService,
    types::{Plan, SeedSet},
    utils::normalize,
};

/// Resolves plan entities into Spotify seed IDs.
pub struct SeedResolver {
    music: Arc<dyn MusicService>,
    concurrency: usize,
}

impl SeedResolver {
    pub fn new(music: Arc<dyn MusicService>, concurrency: usize) -> Self {
        Self {
            music,
            concurrency: concurrency.max(1),
        }
    }

    /// Builds the seed set for `plan`.
    ///
    /// - artists: best match for each of the first five names
    /// - genres: plan genres that the recommendations endpoint accepts
    /// - tracks: explicit titles, then, only when neither artists nor genres
    ///   matched, one search per keyword until five tracks are found
    ///
    /// # Errors
    ///
    /// [`AppError::NoSeeds`] when nothing resolved. Upstream failures are
    /// surfaced as they are.
    pub async fn resolve_seeds(
        &self,
        token: &str,
        plan: &Plan,
        market: Option<&str>,
    ) -> Result<SeedSet, AppError> {
        let mut seeds = SeedSet {
            artist_ids: self.artist_seeds(token, plan).await?,
            genre_ids: self.genre_seeds(token, plan).await?,
            track_ids: Vec::new(),
        };

        let mut seen = HashSet::new();
        for title in plan.include_tracks.iter().take(SeedSet::MAX_PER_KIND) {
            if let Some(track) = self
                .music
                .search_tracks(token, title, 1, market)
                .await?
                .into_iter()
                .next()
            {
                if seen.insert(track.id.clone()) {
                    seeds.track_ids.push(track.id);
                }
            }
        }

        if seeds.artist_ids.is_empty() && seeds.genre_ids.is_empty() {
            for keyword in &plan.keywords {
                if seeds.track_ids.len() >= SeedSet::MAX_PER_KIND {
                    break;
                }
                if let Some(track) = self
                    .music
                    .search_tracks(token, keyword, 1, market)
                    .await?
                    .into_iter()
                    .next()
                {
                    if seen.insert(track.id.clone()) {
                        seeds.track_ids.push(track.id);
                    }
                }
            }
        }

        if seeds.is_empty() {
            tracing::info!("No seeds resolved from plan");
            return Err(AppError::NoSeeds);
        }

        tracing::debug!(
            artists = seeds.artist_ids.len(),
            genres = seeds.genre_ids.len(),
            tracks = seeds.track_ids.len(),
            "Seeds resolved"
        );
        Ok(seeds)
    }

    async fn artist_seeds(&self, token: &str, plan: &Plan) -> Result<Vec<String>, AppError> {
        let names: Vec<String> = plan
            .include_artists
            .iter()
            .take(SeedSet::MAX_PER_KIND)
            .cloned()
            .collect();

        let hits: Vec<Option<String>> = stream::iter(names)
            .map(|name| {
                let music = Arc::clone(&self.music);
                let token = token.to_string();
                async move {
                    let found = music.search_artists(&token, &name, 1).await?;
                    Ok::<_, AppError>(found.into_iter().next().map(|a| a.id))
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut seen = HashSet::new();
        Ok(hits
            .into_iter()
            .flatten()
            .filter(|id| seen.insert(id.clone()))
            .take(SeedSet::MAX_PER_KIND)
            .collect())
    }

    async fn genre_seeds(&self, token: &str, plan: &Plan) -> Result<Vec<String>, AppError> {
        if plan.include_genres.is_empty() {
            return Ok(Vec::new());
        }

        let allowed = self.music.allowed_genres(token).await?;
        let mut picked = Vec::new();
        for genre in &plan.include_genres {
            let wanted = seed_form(genre);
            if let Some(hit) = allowed.iter().find(|a| seed_form(a) == wanted) {
                if !picked.contains(hit) {
                    picked.push(hit.clone());
                }
            }
            if picked.len() >= SeedSet::MAX_PER_KIND {
                break;
            }
        }
        Ok(picked)
    }
}

/// Genre seeds are lowercase and hyphenated: "Hip Hop" → "hip-hop".
fn seed_form(genre: &str) -> String {
    normalize(genre).replace(' ', "-")
}

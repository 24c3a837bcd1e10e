//! # Generation pipeline
//!
//! Everything between a prompt and a publishable track list, plus the
//! publisher that writes the list back to the user's account.
//!
//! ```text
//! prompt ─► Planner ─► SeedResolver ─► Aggregator ─► PreviewResolver ─► tracks
//!                           │               │
//!                           └── MusicService┘
//! tracks ─► Publisher ─► me ─► create playlist ─► add tracks ×⌈n/100⌉
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::{
    config::PipelineSettings,
    error::AppError,
    planner::Planner,
    preview::PreviewResolver,
    spotify::MusicService,
    types::{Plan, Track},
};

mod aggregate;
mod publish;
mod seeds;

pub use aggregate::{Aggregator, COUNT_TOLERANCE, apply_diversity_cap, is_excluded};
pub use publish::{
    ADD_TRACKS_BATCH, DEFAULT_PLAYLIST_NAME, PublishRequest, Publisher, playlist_name,
};
pub use seeds::SeedResolver;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPlaylist {
    pub plan: Plan,
    pub plan_source: &'static str,
    pub tracks: Vec<Track>,
}

pub struct PlaylistGenerator {
    music: Arc<dyn MusicService>,
    planner: Arc<Planner>,
    seeds: SeedResolver,
    aggregator: Aggregator,
    previews: Arc<PreviewResolver>,
    default_market: String,
}

impl PlaylistGenerator {
    pub fn new(
        music: Arc<dyn MusicService>,
        planner: Arc<Planner>,
        previews: Arc<PreviewResolver>,
        settings: PipelineSettings,
        default_market: impl Into<String>,
    ) -> Self {
        Self {
            seeds: SeedResolver::new(music.clone(), settings.lookup_concurrency),
            aggregator: Aggregator::new(music.clone(), settings),
            music,
            planner,
            previews,
            default_market: default_market.into(),
        }
    }

    /// Prompt to track list.
    ///
    /// The user's country is used as the market when the profile has one.
    pub async fn generate(
        &self,
        token: &str,
        prompt: &str,
        approx_count: Option<u32>,
    ) -> Result<GeneratedPlaylist, AppError> {
        let market = match self.music.me(token).await {
            Ok(me) => me.country.unwrap_or_else(|| self.default_market.clone()),
            Err(AppError::Unauthenticated) => return Err(AppError::Unauthenticated),
            Err(e) => {
                tracing::warn!(error = %e, "Profile lookup failed, using default market");
                self.default_market.clone()
            }
        };

        let proposed = self.planner.propose_plan(prompt, approx_count).await?;
        let plan = proposed.plan;

        let seeds = self
            .seeds
            .resolve_seeds(token, &plan, Some(&market))
            .await?;
        let tracks = self
            .aggregator
            .generate(token, &seeds, &plan, Some(&market))
            .await?;
        let tracks = self.previews.resolve_all(tracks).await;

        tracing::info!(
            source = proposed.source,
            target = plan.target_count,
            tracks = tracks.len(),
            "Playlist generated"
        );
        Ok(GeneratedPlaylist {
            plan,
            plan_source: proposed.source,
            tracks,
        })
    }
}

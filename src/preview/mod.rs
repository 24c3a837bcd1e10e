//! # Preview Resolver
//!
//! Best-effort lookup of a playable 30 s preview for each generated track.
//! The track's own `preview_url` wins; otherwise the external catalogs are
//! asked in rank order. Hits and misses are both cached under the normalised
//! `name::primary artist` key, so a track is looked up at most once per TTL.
//!
//! Nothing in here can fail a generation: catalog errors are logged and
//! treated as misses.

use std::{sync::Arc, time::Duration};

use futures_util::stream::{self, StreamExt};
use reqwest::Client;

use crate::{types::Track, utils::normalize};

mod cache;
mod catalogs;

pub use cache::{MemoryPreviewCache, PreviewCache};
pub use catalogs::{DeezerCatalog, ItunesCatalog, PreviewCatalog};

/// Previews do not move; a day keeps the cache small without refetching often.
pub const DEFAULT_PREVIEW_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct PreviewResolver {
    cache: Arc<dyn PreviewCache>,
    catalogs: Vec<Box<dyn PreviewCatalog>>,
    ttl: Duration,
    concurrency: usize,
}

impl PreviewResolver {
    pub fn new(
        cache: Arc<dyn PreviewCache>,
        catalogs: Vec<Box<dyn PreviewCatalog>>,
        ttl: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            cache,
            catalogs,
            ttl,
            concurrency: concurrency.max(1),
        }
    }

    /// iTunes first, then Deezer, sharing one HTTP client.
    pub fn with_default_catalogs(http: Client, country: &str, concurrency: usize) -> Self {
        Self::new(
            Arc::new(MemoryPreviewCache::new()),
            vec![
                Box::new(ItunesCatalog::new(http.clone(), country)),
                Box::new(DeezerCatalog::new(http)),
            ],
            DEFAULT_PREVIEW_TTL,
            concurrency,
        )
    }

    pub fn cache_key(track: &Track) -> String {
        format!(
            "{}::{}",
            normalize(&track.name),
            normalize(track.primary_artist())
        )
    }

    /// Returns a preview URL for `track`, or `None` when no source has one.
    pub async fn resolve_preview(&self, track: &Track) -> Option<String> {
        let key = Self::cache_key(track);
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }

        if let Some(own) = track.preview_url.as_ref().filter(|u| !u.is_empty()) {
            self.cache.put(&key, Some(own.clone()), self.ttl).await;
            return Some(own.clone());
        }

        let mut found = None;
        for catalog in &self.catalogs {
            match catalog
                .find_preview(track.primary_artist(), &track.name)
                .await
            {
                Ok(Some(url)) => {
                    tracing::debug!(catalog = catalog.name(), track = %track.id, "Preview found");
                    found = Some(url);
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(catalog = catalog.name(), error = %e, "Preview lookup failed");
                }
            }
        }

        self.cache.put(&key, found.clone(), self.ttl).await;
        found
    }

    /// Fills `preview_url` on every track, with bounded concurrency. Order is kept.
    pub async fn resolve_all(&self, tracks: Vec<Track>) -> Vec<Track> {
        stream::iter(tracks)
            .map(|mut track| async move {
                track.preview_url = self.resolve_preview(&track).await;
                track
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

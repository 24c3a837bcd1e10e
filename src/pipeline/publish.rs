use std::{collections::HashSet, sync::Arc};

use serde::Deserialize;

use crate::{
    error::AppError,
    spotify::MusicService,
    types::{CreatePlaylistRequest, PublishedPlaylist},
};

/// Spotify rejects larger batches on `POST /playlists/{id}/tracks`.
pub const ADD_TRACKS_BATCH: usize = 100;
pub const MAX_NAME_CHARS: usize = 120;
pub const DEFAULT_PLAYLIST_NAME: &str = "Playlist by moodmix";
const DEFAULT_DESCRIPTION: &str = "Generated with moodmix";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub track_uris: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
}

pub struct Publisher {
    music: Arc<dyn MusicService>,
}

impl Publisher {
    pub fn new(music: Arc<dyn MusicService>) -> Self {
        Self { music }
    }

    /// Creates a playlist for the current user and fills it.
    ///
    /// Batches are appended one after the other. The first failing batch
    /// stops the run; the playlist is left as is and reported through
    /// [`AppError::PublishIncomplete`].
    ///
    /// # Errors
    ///
    /// - [`AppError::NoTracks`] before any network call when there is nothing to add
    /// - [`AppError::PublishIncomplete`] when a batch fails after creation
    pub async fn publish(
        &self,
        token: &str,
        request: &PublishRequest,
    ) -> Result<PublishedPlaylist, AppError> {
        let uris = clean_uris(&request.track_uris);
        if uris.is_empty() {
            return Err(AppError::NoTracks);
        }

        let me = self.music.me(token).await?;
        let create = CreatePlaylistRequest {
            name: playlist_name(&request.name),
            description: request
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or(DEFAULT_DESCRIPTION)
                .to_string(),
            public: request.public.unwrap_or(false),
        };
        let playlist = self.music.create_playlist(token, &me.id, &create).await?;
        tracing::info!(playlist = %playlist.playlist_id, tracks = uris.len(), "Playlist created");

        for (i, batch) in uris.chunks(ADD_TRACKS_BATCH).enumerate() {
            if let Err(e) = self
                .music
                .add_tracks(token, &playlist.playlist_id, batch)
                .await
            {
                tracing::warn!(
                    playlist = %playlist.playlist_id,
                    batch = i,
                    error = %e,
                    "Adding tracks failed, playlist left incomplete"
                );
                return Err(AppError::PublishIncomplete {
                    playlist_id: playlist.playlist_id,
                    status: e.upstream_status().unwrap_or_else(|| e.status_code().as_u16()),
                });
            }
        }

        Ok(playlist)
    }
}

/// Trimmed, at most 120 characters, never blank.
pub fn playlist_name(raw: &str) -> String {
    let name: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    let name = name.trim_end().to_string();
    if name.is_empty() {
        DEFAULT_PLAYLIST_NAME.to_string()
    } else {
        name
    }
}

/// Drops blanks and repeats, keeping the first occurrence.
fn clean_uris(uris: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    uris.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .filter(|u| seen.insert(u.to_string()))
        .map(String::from)
        .collect()
}

use crate::{
    error::AppError,
    types::{
        AddTrackToPlaylistRequest, CreatePlaylistRequest, CreatePlaylistResponse, MeResponse,
        PublishedPlaylist, UserProfile,
    },
};

use super::SpotifyClient;

/// Fetches the profile of the user owning the token.
pub async fn me(client: &SpotifyClient, token: &str) -> Result<UserProfile, AppError> {
    let response = client
        .http
        .get(client.api("/me"))
        .bearer_auth(token)
        .send()
        .await?;

    let me = SpotifyClient::ensure_success(response, "current user")
        .await?
        .json::<MeResponse>()
        .await?;

    Ok(UserProfile {
        display_name: me.display_name.filter(|n| !n.is_empty()).unwrap_or_else(|| me.id.clone()),
        avatar_url: me.images.first().map(|i| i.url.clone()),
        country: me.country,
        id: me.id,
    })
}

/// Creates an empty playlist owned by `user_id`.
pub async fn create(
    client: &SpotifyClient,
    token: &str,
    user_id: &str,
    request: &CreatePlaylistRequest,
) -> Result<PublishedPlaylist, AppError> {
    let url = client.api(&format!(
        "/users/{user}/playlists",
        user = urlencoding::encode(user_id)
    ));
    let response = client
        .http
        .post(url)
        .bearer_auth(token)
        .json(request)
        .send()
        .await?;

    let created = SpotifyClient::ensure_success(response, "create playlist")
        .await?
        .json::<CreatePlaylistResponse>()
        .await?;

    Ok(PublishedPlaylist {
        external_url: created
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", created.id)),
        playlist_id: created.id,
    })
}

/// Appends one batch of track URIs. The endpoint rejects more than 100.
pub async fn add_tracks(
    client: &SpotifyClient,
    token: &str,
    playlist_id: &str,
    uris: &[String],
) -> Result<(), AppError> {
    let url = client.api(&format!(
        "/playlists/{id}/tracks",
        id = urlencoding::encode(playlist_id)
    ));
    let response = client
        .http
        .post(url)
        .bearer_auth(token)
        .json(&AddTrackToPlaylistRequest {
            uris: uris.to_vec(),
        })
        .send()
        .await?;

    SpotifyClient::ensure_success(response, "add tracks").await?;
    Ok(())
}

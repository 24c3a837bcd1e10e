use url::Url;

use crate::{config::SpotifySettings, error::AppError, types::TokenGrant};

use super::SpotifyClient;

/// Builds the authorize redirect target for the PKCE flow.
///
/// # Arguments
///
/// * `settings` - client ID, redirect URI, scopes and authorize endpoint
/// * `state` - anti-forgery nonce echoed back on the callback
/// * `code_challenge` - `BASE64URL(SHA256(verifier))`
///
/// # Example
///
/// ```
/// let url = authorize_url(&settings, &state, &challenge);
/// // https://accounts.spotify.com/authorize?response_type=code&client_id=...&code_challenge_method=S256
/// ```
pub fn authorize_url(settings: &SpotifySettings, state: &str, code_challenge: &str) -> Url {
    let mut url = settings.auth_url.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &settings.client_id)
        .append_pair("redirect_uri", settings.redirect_uri.as_str())
        .append_pair("scope", &settings.scopes.join(" "))
        .append_pair("state", state)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "S256");
    url
}

/// Exchanges an authorization code for tokens using PKCE.
///
/// Completes the OAuth 2.0 PKCE flow by exchanging the authorization code
/// received from the callback. The verifier proves that the client that
/// started the flow is the one finishing it. Codes are single-use; a replay
/// is rejected by the token endpoint itself.
///
/// # Errors
///
/// A refused code is [`AppError::TokenExchangeFailed`]; an endpoint that
/// failed yields [`AppError::UpstreamHttpError`] or [`AppError::Http`]. The
/// upstream body is logged, not returned.
pub async fn exchange_code_pkce(
    client: &SpotifyClient,
    code: &str,
    verifier: &str,
) -> Result<TokenGrant, AppError> {
    let redirect_uri = client.settings.redirect_uri.to_string();
    token_request(
        client,
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client.settings.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_uri.as_str()),
        ],
        "authorization code exchange",
    )
    .await
}

/// Refreshes an expired access token using a refresh token.
///
/// The response may or may not carry a rotated refresh token; merging with
/// the previous one is the caller's job (see `TokenPair::from_grant`).
///
/// # Errors
///
/// Returns [`AppError::TokenExchangeFailed`] when the refresh token is
/// expired or revoked, [`AppError::UpstreamHttpError`] or [`AppError::Http`]
/// when the endpoint itself failed.
pub async fn refresh_token(
    client: &SpotifyClient,
    refresh_token: &str,
) -> Result<TokenGrant, AppError> {
    token_request(
        client,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client.settings.client_id.as_str()),
        ],
        "refresh token exchange",
    )
    .await
}

async fn token_request(
    client: &SpotifyClient,
    form: &[(&str, &str)],
    operation: &'static str,
) -> Result<TokenGrant, AppError> {
    let mut request = client
        .http
        .post(client.settings.token_url.clone())
        .form(form);

    // confidential clients authenticate with Basic auth on top of PKCE
    if let Some(secret) = &client.settings.client_secret {
        request = request.basic_auth(&client.settings.client_id, Some(secret));
    }

    let response = request.send().await.map_err(|e| {
        tracing::warn!(operation, error = %e, "Token endpoint unreachable");
        AppError::Http(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            operation,
            status = status.as_u16(),
            body = %body,
            "Token endpoint rejected grant"
        );
        // 4xx is a refused grant (invalid_grant and friends), 5xx an outage
        return Err(if status.is_client_error() {
            AppError::TokenExchangeFailed
        } else {
            AppError::UpstreamHttpError {
                status: status.as_u16(),
            }
        });
    }

    let grant = response.json::<TokenGrant>().await.map_err(|e| {
        tracing::warn!(operation, error = %e, "Unreadable token response");
        AppError::UpstreamHttpError { status: 502 }
    })?;

    if grant.access_token.is_empty() {
        tracing::warn!(operation, "Token response without access token");
        return Err(AppError::TokenExchangeFailed);
    }
    Ok(grant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> SpotifySettings {
        SpotifySettings {
            client_id: "test-client".into(),
            client_secret: None,
            redirect_uri: "http://127.0.0.1:8080/api/auth/callback".parse().unwrap(),
            auth_url: crate::config::DEFAULT_AUTH_URL.parse().unwrap(),
            token_url: crate::config::DEFAULT_TOKEN_URL.parse().unwrap(),
            api_url: crate::config::DEFAULT_API_URL.into(),
            scopes: vec!["user-read-email".into(), "playlist-modify-private".into()],
            market: "FR".into(),
        }
    }

    #[test]
    fn test_authorize_url_contains_pkce() {
        let url = authorize_url(&test_settings(), "st4te", "ch4llenge");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "test-client");
        assert_eq!(pairs["state"], "st4te");
        assert_eq!(pairs["code_challenge"], "ch4llenge");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["scope"], "user-read-email playlist-modify-private");
        assert_eq!(
            pairs["redirect_uri"],
            "http://127.0.0.1:8080/api/auth/callback"
        );
    }
}

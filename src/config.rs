//! Configuration management for moodmix.
//!
//! This module handles loading and accessing configuration values from environment
//! variables and `.env` files. Values are read once at startup into [`Settings`],
//! which is then shared read-only by the server.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)

use std::{env, path::PathBuf};

use axum_extra::extract::cookie::Key;
use url::Url;

use crate::error::AppError;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SCOPES: [&str; 3] = [
    "user-read-email",
    "playlist-modify-public",
    "playlist-modify-private",
];

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the necessary directory structure if it doesn't exist and loads
/// environment variables from `moodmix/.env` under the platform-specific local
/// data directory:
/// - Linux: `~/.local/share/moodmix/.env`
/// - macOS: `~/Library/Application Support/moodmix/.env`
/// - Windows: `%LOCALAPPDATA%/moodmix/.env`
///
/// A missing file is not an error; variables may come from the process
/// environment alone.
///
/// # Errors
///
/// Returns an error string if the directory cannot be created or the file
/// exists but cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("moodmix/.env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Which planner backends exist, in the order they can be listed in `PLAN_PROVIDERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    OpenRouter,
    Heuristic,
}

impl std::str::FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            "heuristic" => Ok(Self::Heuristic),
            other => Err(AppError::Config(format!("unknown plan provider '{other}'"))),
        }
    }
}

/// What the planner does once every configured provider has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFallback {
    /// Degrade to the deterministic keyword planner.
    Heuristic,
    /// Surface `AllProvidersFailed`.
    None,
}

/// Accuracy/cost trade-off for genre exclusions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreExclusion {
    /// Fetch artist genre tags to apply genre exclusions.
    Lookup,
    /// Skip the extra calls; genre exclusions are ignored.
    Skip,
}

#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Url,
    pub auth_url: Url,
    pub token_url: Url,
    pub api_url: String,
    pub scopes: Vec<String>,
    pub market: String,
}

#[derive(Debug, Clone, Default)]
pub struct LlmSettings {
    pub openai_key: Option<String>,
    pub openai_model: String,
    pub gemini_key: Option<String>,
    pub gemini_model: String,
    pub openrouter_key: Option<String>,
    pub openrouter_model: String,
}

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub order: Vec<ProviderKind>,
    pub fallback: PlanFallback,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub overfetch_factor: u32,
    pub genre_exclusion: GenreExclusion,
    pub lookup_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            overfetch_factor: 2,
            genre_exclusion: GenreExclusion::Lookup,
            lookup_concurrency: 6,
        }
    }
}

/// Everything the server needs, resolved once at startup.
#[derive(Clone)]
pub struct Settings {
    pub server_addr: String,
    pub frontend_url: String,
    pub cookie_key: Key,
    pub secure_cookies: bool,
    pub rate_limit_per_minute: u32,
    pub spotify: SpotifySettings,
    pub planner: PlannerSettings,
    pub pipeline: PipelineSettings,
}

impl Settings {
    /// Builds settings from the process environment.
    ///
    /// # Required env vars
    /// - `SPOTIFY_CLIENT_ID`
    /// - `SPOTIFY_REDIRECT_URI` (must be a valid URL)
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        let spotify = SpotifySettings {
            client_id: required("SPOTIFY_CLIENT_ID")?,
            client_secret: optional("SPOTIFY_CLIENT_SECRET"),
            redirect_uri: parse_url("SPOTIFY_REDIRECT_URI", &required("SPOTIFY_REDIRECT_URI")?)?,
            auth_url: parse_url(
                "SPOTIFY_AUTH_URL",
                &optional("SPOTIFY_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.into()),
            )?,
            token_url: parse_url(
                "SPOTIFY_TOKEN_URL",
                &optional("SPOTIFY_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
            )?,
            api_url: optional("SPOTIFY_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.into())
                .trim_end_matches('/')
                .to_string(),
            scopes: optional("SPOTIFY_SCOPES")
                .map(|s| split_list(&s))
                .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()),
            market: optional("SPOTIFY_MARKET").unwrap_or_else(|| "FR".into()),
        };

        let order = match optional("PLAN_PROVIDERS") {
            Some(list) => split_list(&list)
                .iter()
                .map(|p| p.parse())
                .collect::<Result<Vec<ProviderKind>, _>>()?,
            None => vec![
                ProviderKind::OpenAi,
                ProviderKind::Gemini,
                ProviderKind::OpenRouter,
            ],
        };

        let fallback = match optional("PLAN_FALLBACK").as_deref() {
            None | Some("heuristic") => PlanFallback::Heuristic,
            Some("none") => PlanFallback::None,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "PLAN_FALLBACK must be 'heuristic' or 'none', got '{other}'"
                )));
            }
        };

        let planner = PlannerSettings {
            order,
            fallback,
            llm: LlmSettings {
                openai_key: optional("OPENAI_API_KEY"),
                openai_model: optional("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
                gemini_key: optional("GEMINI_API_KEY"),
                gemini_model: optional("GEMINI_MODEL")
                    .unwrap_or_else(|| "gemini-1.5-flash".into()),
                openrouter_key: optional("OPENROUTER_API_KEY"),
                openrouter_model: optional("OPENROUTER_MODEL")
                    .unwrap_or_else(|| "google/gemini-2.0-flash-001".into()),
            },
        };

        let genre_exclusion = match optional("GENRE_EXCLUSION").as_deref() {
            None | Some("lookup") => GenreExclusion::Lookup,
            Some("skip") => GenreExclusion::Skip,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "GENRE_EXCLUSION must be 'lookup' or 'skip', got '{other}'"
                )));
            }
        };

        let pipeline = PipelineSettings {
            overfetch_factor: parse_number("OVERFETCH_FACTOR", 2)?.max(2),
            genre_exclusion,
            lookup_concurrency: parse_number("LOOKUP_CONCURRENCY", 6usize)?.clamp(1, 10),
        };

        let cookie_key = match optional("COOKIE_KEY") {
            Some(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                AppError::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            None => {
                tracing::warn!("COOKIE_KEY not set, sessions will not survive a restart");
                Key::generate()
            }
        };

        Ok(Self {
            server_addr: optional("SERVER_ADDRESS").unwrap_or_else(|| "127.0.0.1:8080".into()),
            frontend_url: frontend_base(optional("FRONTEND_URL")),
            cookie_key,
            secure_cookies: matches!(optional("SECURE_COOKIES").as_deref(), Some("1" | "true")),
            rate_limit_per_minute: parse_number("RATE_LIMIT_PER_MINUTE", 60)?,
            spotify,
            planner,
            pipeline,
        })
    }
}

/// Normalises the landing base so that `"{base}app"` and `"{base}?error=x"` are valid.
pub fn frontend_base(raw: Option<String>) -> String {
    match raw {
        Some(url) if !url.trim().is_empty() => format!("{}/", url.trim().trim_end_matches('/')),
        _ => "/".to_string(),
    }
}

fn required(name: &str) -> Result<String, AppError> {
    optional(name).ok_or_else(|| AppError::Config(format!("{name} is required")))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_url(name: &str, value: &str) -> Result<Url, AppError> {
    value
        .parse()
        .map_err(|e| AppError::Config(format!("{name}: {e}")))
}

fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match optional(name) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{name} must be a number, got '{v}'"))),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

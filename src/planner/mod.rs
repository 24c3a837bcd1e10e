//! # Plan Provider
//!
//! Turns a free-text prompt into a [`Plan`]. Backends implement
//! [`PlanProvider`]; the [`Planner`] tries them in the configured order and
//! applies the deployment's fallback policy when all of them fail.
//!
//! ```text
//! prompt ─► openai ─✗─► gemini ─✗─► openrouter ─✗─► heuristic | AllProvidersFailed
//!             │ ok         │ ok          │ ok
//!             └────────────┴─────────────┴──► normalize ─► Plan
//! ```
//!
//! Heuristic plans are never merged with model output: the result carries the
//! name of the one provider that produced it.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    config::{PlanFallback, PlannerSettings, ProviderKind},
    error::AppError,
    types::{Plan, Popularity},
    utils::{dedupe_normalized, normalize},
};

pub mod heuristic;
pub mod json;
pub mod llm;

pub use heuristic::HeuristicPlanner;
pub use llm::{GeminiPlanner, OpenAiPlanner, OpenRouterPlanner};

/// Plans default to this size when neither the prompt nor the caller says.
pub const DEFAULT_TARGET_COUNT: u32 = 20;
pub const MAX_TARGET_COUNT: u32 = 100;

const MAX_INCLUDE_ARTISTS: usize = 8;
const MAX_INCLUDE_GENRES: usize = 8;
const MAX_KEYWORDS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider answered with status {0}")]
    Status(u16),

    #[error("no JSON object in provider output")]
    Unparsable,

    #[error("plan has nothing to search for")]
    Empty,
}

/// One way of turning a prompt into a plan.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    /// Short identifier reported as `planSource`.
    fn name(&self) -> &'static str;

    /// `false` when the provider lacks credentials and must be skipped.
    fn is_configured(&self) -> bool {
        true
    }

    /// Proposes a normalised plan. Fails fast; the planner moves on.
    async fn propose(&self, prompt: &str, approx_count: Option<u32>) -> Result<Plan, PlanError>;
}

/// A plan and the provider that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedPlan {
    pub plan: Plan,
    pub source: &'static str,
}

pub struct Planner {
    providers: Vec<Box<dyn PlanProvider>>,
    fallback: Option<Box<dyn PlanProvider>>,
}

impl Planner {
    pub fn new(providers: Vec<Box<dyn PlanProvider>>, fallback: PlanFallback) -> Self {
        let fallback: Option<Box<dyn PlanProvider>> = match fallback {
            PlanFallback::Heuristic => Some(Box::new(HeuristicPlanner)),
            PlanFallback::None => None,
        };
        Self {
            providers,
            fallback,
        }
    }

    /// Builds the provider chain in `settings.order`.
    pub fn from_settings(settings: &PlannerSettings, http: reqwest::Client) -> Self {
        let llm = &settings.llm;
        let providers = settings
            .order
            .iter()
            .map(|kind| -> Box<dyn PlanProvider> {
                match kind {
                    ProviderKind::OpenAi => Box::new(OpenAiPlanner::new(
                        http.clone(),
                        llm.openai_key.clone(),
                        llm.openai_model.clone(),
                    )),
                    ProviderKind::Gemini => Box::new(GeminiPlanner::new(
                        http.clone(),
                        llm.gemini_key.clone(),
                        llm.gemini_model.clone(),
                    )),
                    ProviderKind::OpenRouter => Box::new(OpenRouterPlanner::new(
                        http.clone(),
                        llm.openrouter_key.clone(),
                        llm.openrouter_model.clone(),
                    )),
                    ProviderKind::Heuristic => Box::new(HeuristicPlanner),
                }
            })
            .collect();
        Self::new(providers, settings.fallback)
    }

    /// Names of the providers that will actually be called, in order.
    pub fn configured(&self) -> Vec<&'static str> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .map(|p| p.name())
            .collect()
    }

    /// Runs the provider chain.
    ///
    /// # Errors
    ///
    /// - [`AppError::NoProviderConfigured`] if no listed provider has credentials
    /// - [`AppError::AllProvidersFailed`] if all of them failed and the
    ///   heuristic fallback is disabled
    pub async fn propose_plan(
        &self,
        prompt: &str,
        approx_count: Option<u32>,
    ) -> Result<ProposedPlan, AppError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::BadRequest("prompt must not be empty".into()));
        }

        let configured: Vec<&dyn PlanProvider> = self
            .providers
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| p.is_configured())
            .collect();
        if configured.is_empty() {
            tracing::error!("No plan provider has credentials");
            return Err(AppError::NoProviderConfigured);
        }

        for provider in configured {
            match provider.propose(prompt, approx_count).await {
                Ok(plan) if !plan.is_empty() => {
                    tracing::info!(provider = provider.name(), "Plan proposed");
                    return Ok(ProposedPlan {
                        plan,
                        source: provider.name(),
                    });
                }
                Ok(_) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %PlanError::Empty,
                        "Plan provider failed"
                    );
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Plan provider failed");
                }
            }
        }

        match &self.fallback {
            Some(fallback) => {
                let plan = fallback
                    .propose(prompt, approx_count)
                    .await
                    .map_err(|_| AppError::AllProvidersFailed)?;
                tracing::info!(provider = fallback.name(), "Falling back to heuristic plan");
                Ok(ProposedPlan {
                    plan,
                    source: fallback.name(),
                })
            }
            None => Err(AppError::AllProvidersFailed),
        }
    }
}

/// Clamps a requested count into `[1, 100]`, defaulting to 20.
pub fn clamp_count(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_TARGET_COUNT)
        .clamp(1, MAX_TARGET_COUNT)
}

/// Loosely-typed plan as produced by a model, before normalisation.
///
/// Accepts the field spellings the planners have been seen to emit:
/// `n`/`targetCount`/`approx_n`, `artists`/`includeArtists`/`artists_include`,
/// an `exclusions {artists, genres, terms}` object, and so on. A list may
/// arrive as an array, a comma separated string, or be missing.
#[derive(Debug, Clone, Default)]
pub struct PlanDraft {
    pub target_count: Option<u32>,
    pub include_artists: Vec<String>,
    pub include_genres: Vec<String>,
    pub include_tracks: Vec<String>,
    pub keywords: Vec<String>,
    pub exclude_artists: Vec<String>,
    pub exclude_genres: Vec<String>,
    pub exclude_tracks: Vec<String>,
    pub popularity: Option<Popularity>,
}

impl PlanDraft {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let exclusions = obj.get("exclusions").and_then(Value::as_object);
        let nested = |key: &str| -> Vec<String> {
            exclusions
                .and_then(|e| e.get(key))
                .map(coerce_list)
                .unwrap_or_default()
        };

        let mut exclude_artists = field_list(
            obj,
            &["excludeArtists", "artists_exclude", "exclude_artists"],
        );
        exclude_artists.extend(nested("artists"));
        let mut exclude_genres =
            field_list(obj, &["excludeGenres", "genres_exclude", "exclude_genres"]);
        exclude_genres.extend(nested("genres"));
        let mut exclude_tracks =
            field_list(obj, &["excludeTracks", "tracks_exclude", "exclude_tracks"]);
        exclude_tracks.extend(nested("terms"));
        exclude_tracks.extend(nested("tracks"));

        Self {
            target_count: ["targetCount", "n", "approx_n", "count"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(coerce_count)),
            include_artists: field_list(
                obj,
                &["includeArtists", "artists", "artists_include", "include_artists"],
            ),
            include_genres: field_list(
                obj,
                &["includeGenres", "genres", "genres_include", "include_genres"],
            ),
            include_tracks: field_list(
                obj,
                &["includeTracks", "tracks", "tracks_include", "include_tracks"],
            ),
            keywords: field_list(obj, &["keywords", "terms"]),
            exclude_artists,
            exclude_genres,
            exclude_tracks,
            popularity: obj
                .get("popularity")
                .and_then(Value::as_str)
                .and_then(parse_popularity),
        }
    }

    /// Produces the immutable plan.
    ///
    /// Lists are trimmed and deduplicated case-insensitively, genres are
    /// lowercased, exclusions normalised, and anything both included and
    /// excluded is dropped from the include side. The count prefers the
    /// model's value, then `approx_count`, then 20, clamped to `[1, 100]`.
    pub fn normalize(self, approx_count: Option<u32>) -> Plan {
        let exclude_artists: std::collections::BTreeSet<String> = self
            .exclude_artists
            .iter()
            .map(|a| normalize(a))
            .filter(|a| !a.is_empty())
            .collect();
        let exclude_genres: std::collections::BTreeSet<String> = self
            .exclude_genres
            .iter()
            .map(|g| normalize(g))
            .filter(|g| !g.is_empty())
            .collect();

        let mut include_artists = dedupe_normalized(self.include_artists);
        include_artists.retain(|a| !exclude_artists.contains(&normalize(a)));
        include_artists.truncate(MAX_INCLUDE_ARTISTS);

        let mut include_genres =
            dedupe_normalized(self.include_genres.into_iter().map(|g| normalize(&g)));
        include_genres.retain(|g| !exclude_genres.contains(g));
        include_genres.truncate(MAX_INCLUDE_GENRES);

        let mut keywords = dedupe_normalized(self.keywords);
        keywords.truncate(MAX_KEYWORDS);

        let mut include_tracks = dedupe_normalized(self.include_tracks);
        include_tracks.truncate(crate::types::SeedSet::MAX_PER_KIND);

        Plan {
            target_count: clamp_count(self.target_count.or(approx_count)),
            include_artists,
            include_genres,
            include_tracks,
            keywords,
            exclude_artists,
            exclude_genres,
            exclude_tracks: self
                .exclude_tracks
                .iter()
                .map(|t| normalize(t))
                .filter(|t| !t.is_empty())
                .collect(),
            popularity: self.popularity.unwrap_or_default(),
        }
    }
}

/// Parses model output (raw text) into a normalised plan.
pub fn plan_from_text(text: &str, approx_count: Option<u32>) -> Result<Plan, PlanError> {
    let obj = json::extract_object(text).ok_or(PlanError::Unparsable)?;
    let plan = PlanDraft::from_object(&obj).normalize(approx_count);
    if plan.is_empty() {
        return Err(PlanError::Empty);
    }
    Ok(plan)
}

fn field_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .map(coerce_list)
        .unwrap_or_default()
}

fn coerce_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Object(o) => o
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn coerce_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.round() as u64))
            .map(|n| n.min(u32::MAX as u64) as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_popularity(raw: &str) -> Option<Popularity> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "mainstream" => Some(Popularity::Mainstream),
        "niche" => Some(Popularity::Niche),
        "mixed" => Some(Popularity::Mixed),
        _ => None,
    }
}

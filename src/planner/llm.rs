use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::types::Plan;

use super::{PlanError, PlanProvider, plan_from_text};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SYSTEM_PROMPT: &str = r#"You plan Spotify playlists. You receive a free-text request, possibly in French or slang.
Answer with ONE strict JSON object and nothing else:
{
  "targetCount": <integer>,
  "includeArtists": [artist names, max 8],
  "includeGenres": [Spotify genre seeds when known, max 6],
  "includeTracks": [exact song titles the user asked for, max 5],
  "keywords": [free search terms: language, era, mood, bpm; max 10],
  "excludeArtists": [], "excludeGenres": [], "excludeTracks": [],
  "popularity": "mainstream" | "niche" | "mixed"
}
Rules:
- targetCount: the number the user gives (or "Approx. N"), otherwise 20.
- Everything the user wants to avoid goes into the exclude lists. "No French rap" excludes the genre and its well-known artists.
- Never repeat a value inside a list. Never include an excluded artist or genre.
"#;

fn user_message(prompt: &str, approx_count: Option<u32>) -> String {
    match approx_count {
        Some(n) => format!("{prompt}\nApprox. {n}"),
        None => prompt.to_string(),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Any OpenAI-compatible chat completions endpoint.
struct ChatCompletions {
    http: Client,
    url: String,
    key: Option<String>,
    model: String,
    json_mode: bool,
}

impl ChatCompletions {
    async fn complete(&self, prompt: &str, approx_count: Option<u32>) -> Result<Plan, PlanError> {
        let key = self.key.as_deref().unwrap_or_default();
        let user = user_message(prompt, approx_count);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlanError::Status(response.status().as_u16()));
        }

        let body = response.json::<ChatResponse>().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(PlanError::Unparsable)?;
        plan_from_text(&text, approx_count)
    }
}

pub struct OpenAiPlanner {
    inner: ChatCompletions,
}

impl OpenAiPlanner {
    pub fn new(http: Client, key: Option<String>, model: String) -> Self {
        Self {
            inner: ChatCompletions {
                http,
                url: OPENAI_URL.to_string(),
                key,
                model,
                json_mode: true,
            },
        }
    }

    /// Points the planner at another compatible endpoint.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.inner.url = url.into();
        self
    }
}

#[async_trait]
impl PlanProvider for OpenAiPlanner {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        self.inner.key.is_some()
    }

    async fn propose(&self, prompt: &str, approx_count: Option<u32>) -> Result<Plan, PlanError> {
        self.inner.complete(prompt, approx_count).await
    }
}

pub struct OpenRouterPlanner {
    inner: ChatCompletions,
}

impl OpenRouterPlanner {
    pub fn new(http: Client, key: Option<String>, model: String) -> Self {
        Self {
            inner: ChatCompletions {
                http,
                url: OPENROUTER_URL.to_string(),
                key,
                model,
                // not every routed model honours response_format
                json_mode: false,
            },
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.inner.url = url.into();
        self
    }
}

#[async_trait]
impl PlanProvider for OpenRouterPlanner {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn is_configured(&self) -> bool {
        self.inner.key.is_some()
    }

    async fn propose(&self, prompt: &str, approx_count: Option<u32>) -> Result<Plan, PlanError> {
        self.inner.complete(prompt, approx_count).await
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiPlanner {
    http: Client,
    base_url: String,
    key: Option<String>,
    model: String,
}

impl GeminiPlanner {
    pub fn new(http: Client, key: Option<String>, model: String) -> Self {
        Self {
            http,
            base_url: GEMINI_URL.to_string(),
            key,
            model,
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl PlanProvider for GeminiPlanner {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    async fn propose(&self, prompt: &str, approx_count: Option<u32>) -> Result<Plan, PlanError> {
        let key = self.key.as_deref().unwrap_or_default();
        let text = format!(
            "{SYSTEM_PROMPT}\n\nUSER:\n{}\nAnswer with JSON only.",
            user_message(prompt, approx_count)
        );
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: &text }],
            }],
            generation_config: GeminiConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlanError::Status(response.status().as_u16()));
        }

        let body = response.json::<GeminiResponse>().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .ok_or(PlanError::Unparsable)?;
        plan_from_text(&text, approx_count)
    }
}

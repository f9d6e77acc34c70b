//! AI nutrition estimator client
//!
//! Defines the [`Estimator`] seam the estimation service calls on a cache miss,
//! and an OpenAI-compatible chat-completions client that implements it. The
//! estimator returns raw JSON; turning it into a [`Nutrition`](super::Nutrition)
//! is the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Default chat-completions API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model used for estimates
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Upper bound on a single estimator round trip
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can occur when calling the estimator
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No API key was configured
    #[error("AI estimator is not configured (set OPENAI_API_KEY)")]
    NotConfigured,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("AI API returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered without any message content
    #[error("AI API returned no content")]
    EmptyResponse,

    /// The message content was not valid JSON
    #[error("AI returned invalid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),
}

/// Coarse classification of an [`UpstreamError`] for tagged results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The estimator is not available in this process
    Unconfigured,
    /// The request did not complete
    Unreachable,
    /// The API refused the request
    Rejected,
    /// The API answered with something unusable
    Malformed,
}

impl UpstreamError {
    /// Returns the coarse kind of this error
    pub fn kind(&self) -> UpstreamErrorKind {
        match self {
            UpstreamError::NotConfigured => UpstreamErrorKind::Unconfigured,
            UpstreamError::Request(_) => UpstreamErrorKind::Unreachable,
            UpstreamError::Status { .. } => UpstreamErrorKind::Rejected,
            UpstreamError::EmptyResponse | UpstreamError::MalformedJson(_) => {
                UpstreamErrorKind::Malformed
            }
        }
    }
}

/// The expensive, non-deterministic nutrition estimate call
#[async_trait]
pub trait Estimator: Send + Sync {
    /// Estimates nutrition for a free-text food description
    ///
    /// The returned JSON is untrusted and must be sanitized before use.
    async fn estimate(&self, food_text: &str) -> Result<Value, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    /// HTTP client for making requests
    http_client: Client,
    api_key: String,
    model: String,
    /// API root (allows override for compatible servers)
    base_url: String,
}

impl OpenAiClient {
    /// Creates a client against the default API root and model
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Uses a different model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Uses a different API root, e.g. a local compatible server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sends one prompt and parses the reply content as JSON
    pub(crate) async fn chat_json(&self, prompt: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        info!(model = %self.model, "calling AI API");
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply = response.json::<ChatResponse>().await?;
        let content = first_content(reply).ok_or(UpstreamError::EmptyResponse)?;
        debug!(content = %content, "AI raw response");

        parse_reply_json(&content)
    }
}

#[async_trait]
impl Estimator for OpenAiClient {
    async fn estimate(&self, food_text: &str) -> Result<Value, UpstreamError> {
        self.chat_json(&nutrition_prompt(food_text)).await
    }
}

/// Builds the prompt asking for a nutrition estimate as bare JSON
fn nutrition_prompt(food_text: &str) -> String {
    format!(
        r#"You are a nutrition expert.
Estimate nutrition for the food below.

Return ONLY valid JSON in this format:
{{
  "calories": number,
  "protein": number,
  "carbs": number,
  "fat": number,
  "micros": {{
    "iron": "Xmg",
    "calcium": "Xmg"
  }}
}}

Food: "{}""#,
        food_text
    )
}

/// Returns the trimmed content of the first choice, if it has any
fn first_content(reply: ChatResponse) -> Option<String> {
    let content = reply.choices.into_iter().next()?.message.content?;
    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// Parses reply content as JSON, tolerating a surrounding Markdown code fence
pub(crate) fn parse_reply_json(content: &str) -> Result<Value, UpstreamError> {
    let trimmed = content.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(fenced) => {
            // Drop an optional language tag on the opening fence line.
            let after_tag = fenced.split_once('\n').map_or("", |(_, rest)| rest);
            after_tag.trim_end().trim_end_matches("```")
        }
        None => trimmed,
    };

    serde_json::from_str(body.trim()).map_err(UpstreamError::MalformedJson)
}

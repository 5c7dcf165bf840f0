//! Client for the Gemini `generateContent` endpoint.
//!
//! Behaviour:
//! - Without an API key every call fails with [`GeminiError::MissingApiKey`] and no I/O.
//! - The prompt is prefixed with the tail of the conversation as `role: text` lines.
//! - Sampling parameters are fixed; one request per call, no retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::conversations::types::{Message, Participant};

/// Default generation endpoint.
pub const DEFAULT_GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Number of context messages kept when building the prompt.
pub const MAX_CONTEXT_MESSAGES: usize = 6;

/// HTTP client timeout for a generation.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

const TEMPERATURE: f32 = 0.7;
const TOP_K: u32 = 40;
const TOP_P: f32 = 0.95;
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// Errors produced by the generator.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// No API key is configured.
    #[error("Gemini API key is not configured")]
    MissingApiKey,
    /// Transport failure (connect, timeout, TLS).
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("connection error: Gemini API returned HTTP {0}")]
    HttpStatus(u16),
    /// The API answered with a body that could not be decoded.
    #[error("Gemini API error: {0}")]
    Decode(String),
    /// The API answered without any candidate text.
    #[error("no response from Gemini")]
    EmptyResponse,
}

/// One entry of the conversation context sent with a prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Author side; any value other than `"mine"` is read as the other side.
    #[serde(deserialize_with = "Participant::deserialize_lenient")]
    pub who: Participant,
    /// Message body.
    pub text: String,
}

impl From<&Message> for ContextMessage {
    fn from(message: &Message) -> Self {
        Self {
            who: message.who,
            text: message.text.clone(),
        }
    }
}

/// Something that turns a prompt plus context into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply to `prompt` given the preceding `context`.
    ///
    /// # Errors
    /// Returns a [`GeminiError`] when generation is unavailable or fails.
    async fn generate(&self, prompt: &str, context: &[ContextMessage]) -> Result<String, GeminiError>;

    /// Whether credentials are available.
    fn is_configured(&self) -> bool;
}

/// Build the text sent to the model.
///
/// Keeps the last [`MAX_CONTEXT_MESSAGES`] entries of `context`. Without context
/// the prompt is returned unchanged.
#[must_use]
pub fn build_prompt(prompt: &str, context: &[ContextMessage]) -> String {
    if context.is_empty() {
        return prompt.to_string();
    }

    let start = context.len().saturating_sub(MAX_CONTEXT_MESSAGES);
    let mut lines: Vec<String> = context[start..]
        .iter()
        .map(|m| format!("{}: {}", m.who.generator_role(), m.text))
        .collect();
    lines.push(format!("user: {prompt}"));
    lines.join("\n")
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate.
    ///
    /// No candidate at all is [`GeminiError::EmptyResponse`]; a candidate
    /// without text is a malformed answer.
    fn into_text(self) -> Result<String, GeminiError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(GeminiError::EmptyResponse)?;
        candidate
            .content
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| GeminiError::Decode("candidate has no text part".to_string()))
    }
}

/// Async Gemini client sharing one connection pool.
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    url: String,
}

impl GeminiClient {
    /// Create a client for `url`, authenticated with `api_key` when present.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>, url: impl Into<String>) -> Result<Self, GeminiError> {
        let client = Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            url: url.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, context: &[ContextMessage]) -> Result<String, GeminiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GeminiError::MissingApiKey);
        };

        let full_prompt = build_prompt(prompt, context);
        let request = GenerateRequest {
            contents: [Content {
                parts: [TextPart { text: &full_prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_k: TOP_K,
                top_p: TOP_P,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        debug!(url = %self.url, context = context.len(), "sending generation request");
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeminiError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: GenerateResponse =
            serde_json::from_slice(&body).map_err(|e| GeminiError::Decode(e.to_string()))?;
        parsed.into_text()
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

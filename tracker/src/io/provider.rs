//! Completion provider abstraction.
//!
//! The [`CompletionClient`] trait decouples trial orchestration from the
//! concrete text-generation backends. Each call is exactly one attempt; retry
//! policy belongs to the caller. Tests use scripted clients that return
//! predetermined completions without touching the network.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::models::ProviderKind;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_LIMIT: usize = 500;

/// Parameters for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub provider: ProviderKind,
    pub model_id: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Upper bound on the whole HTTP exchange.
    pub timeout: Duration,
}

/// Text plus token usage returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    pub fn new(text: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            text: text.into(),
            total_tokens: input_tokens + output_tokens,
            input_tokens,
            output_tokens,
        }
    }
}

/// Any transport, authentication, or quota failure from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("missing credentials: set {0}")]
    MissingCredentials(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication rejected (status {status}): {body}")]
    Auth { status: u16, body: String },
    #[error("quota or rate limit exceeded (status {status}): {body}")]
    Quota { status: u16, body: String },
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// Abstraction over completion backends.
pub trait CompletionClient {
    /// Perform a single completion attempt.
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// API keys per provider.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub gemini: Option<String>,
}

impl Credentials {
    /// Read `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, and `GEMINI_API_KEY`
    /// (falling back to `GOOGLE_API_KEY`).
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|value| !value.trim().is_empty());
        Self {
            anthropic: read("ANTHROPIC_API_KEY"),
            openai: read("OPENAI_API_KEY"),
            gemini: read("GEMINI_API_KEY").or_else(|| read("GOOGLE_API_KEY")),
        }
    }
}

/// Provider base URLs. Overridable for proxies and local test servers.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub anthropic: String,
    pub openai: String,
    pub gemini: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            anthropic: "https://api.anthropic.com".to_string(),
            openai: "https://api.openai.com".to_string(),
            gemini: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

/// Client that calls the Anthropic, OpenAI, and Gemini HTTP APIs.
pub struct HttpCompletionClient {
    http: Client,
    credentials: Credentials,
    endpoints: Endpoints,
}

impl HttpCompletionClient {
    pub fn new(credentials: Credentials, endpoints: Endpoints) -> Result<Self> {
        let http = Client::builder().build().context("build http client")?;
        Ok(Self {
            http,
            credentials,
            endpoints,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(Credentials::from_env(), Endpoints::default())
    }

    fn call_anthropic(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let key = required(&self.credentials.anthropic, "ANTHROPIC_API_KEY")?;
        let url = format!("{}/v1/messages", self.endpoints.anthropic.trim_end_matches('/'));
        let builder = self
            .http
            .post(url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body = send_json(builder, &anthropic_body(request), request.timeout)?;
        parse_anthropic(&body)
    }

    fn call_openai(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let key = required(&self.credentials.openai, "OPENAI_API_KEY")?;
        let url = format!(
            "{}/v1/chat/completions",
            self.endpoints.openai.trim_end_matches('/')
        );
        let builder = self.http.post(url).bearer_auth(key);
        let body = send_json(builder, &openai_body(request), request.timeout)?;
        parse_openai(&body)
    }

    fn call_gemini(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let key = required(&self.credentials.gemini, "GEMINI_API_KEY")?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoints.gemini.trim_end_matches('/'),
            request.model_id
        );
        let builder = self.http.post(url).header("x-goog-api-key", key);
        let body = send_json(builder, &gemini_body(request), request.timeout)?;
        parse_gemini(&body)
    }
}

impl CompletionClient for HttpCompletionClient {
    #[instrument(skip_all, fields(provider = %request.provider, model = %request.model_id))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let result = match request.provider {
            ProviderKind::Anthropic => self.call_anthropic(request),
            ProviderKind::OpenAi => self.call_openai(request),
            ProviderKind::Gemini => self.call_gemini(request),
        };
        match &result {
            Ok(completion) => debug!(
                input_tokens = completion.input_tokens,
                output_tokens = completion.output_tokens,
                "completion received"
            ),
            Err(err) => warn!(error = %err, "completion failed"),
        }
        result
    }
}

fn required<'a>(key: &'a Option<String>, var: &'static str) -> Result<&'a str, ProviderError> {
    key.as_deref().ok_or(ProviderError::MissingCredentials(var))
}

fn send_json(builder: RequestBuilder, body: &Value, timeout: Duration) -> Result<Value, ProviderError> {
    let response = builder
        .timeout(timeout)
        .json(body)
        .send()
        .map_err(|err| ProviderError::Transport(err.to_string()))?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .map_err(|err| ProviderError::Transport(err.to_string()))?;
    if !(200..300).contains(&status) {
        return Err(classify_status(status, &text));
    }
    serde_json::from_str(&text).map_err(|err| ProviderError::Decode(err.to_string()))
}

fn classify_status(status: u16, body: &str) -> ProviderError {
    let body = truncate_body(body);
    match status {
        401 | 403 => ProviderError::Auth { status, body },
        429 => ProviderError::Quota { status, body },
        _ => ProviderError::Status { status, body },
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn anthropic_body(request: &CompletionRequest) -> Value {
    json!({
        "model": request.model_id,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": [{"role": "user", "content": request.prompt}],
    })
}

fn openai_body(request: &CompletionRequest) -> Value {
    json!({
        "model": request.model_id,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": [{"role": "user", "content": request.prompt}],
    })
}

fn gemini_body(request: &CompletionRequest) -> Value {
    json!({
        "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
        "generationConfig": {
            "maxOutputTokens": request.max_tokens,
            "temperature": request.temperature,
        },
    })
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

fn parse_anthropic(body: &Value) -> Result<Completion, ProviderError> {
    let response: AnthropicResponse = decode(body)?;
    let text = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<String>();
    Ok(Completion::new(
        text,
        response.usage.input_tokens,
        response.usage.output_tokens,
    ))
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: OpenAiUsage,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn parse_openai(body: &Value) -> Result<Completion, ProviderError> {
    let response: OpenAiResponse = decode(body)?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("response has no choices".to_string()))?;
    Ok(Completion::new(
        choice.message.content.unwrap_or_default(),
        response.usage.prompt_tokens,
        response.usage.completion_tokens,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

fn parse_gemini(body: &Value) -> Result<Completion, ProviderError> {
    let response: GeminiResponse = decode(body)?;
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| ProviderError::Decode("response has no candidate content".to_string()))?;
    let text = content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<String>();
    let usage = response.usage_metadata.unwrap_or_default();
    Ok(Completion::new(
        text,
        usage.prompt_token_count,
        usage.candidates_token_count,
    ))
}

fn decode<T: for<'de> Deserialize<'de>>(body: &Value) -> Result<T, ProviderError> {
    T::deserialize(body).map_err(|err| ProviderError::Decode(err.to_string()))
}

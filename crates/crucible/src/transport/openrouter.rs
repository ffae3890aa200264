//! OpenAI-compatible chat-completions backend (OpenRouter by default).
//!
//! One [`ChatBackend::complete`] call is one HTTP request. Status codes and
//! client errors are translated here, and only here, into the four
//! [`TransportError`] categories.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::errors::TransportError;
use crate::settings::SettingsError;
use crate::transport::{CallResponse, ChatBackend, Message};

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

pub struct OpenRouterBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenRouterBackend {
    /// `base_url` is the API root, e.g. `https://openrouter.ai/api/v1`.
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, SettingsError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SettingsError::MissingApiKey);
        }
        // Per-attempt timeouts are enforced by the retry layer.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SettingsError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl ChatBackend for OpenRouterBackend {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        correlation_id: Option<&str>,
    ) -> Result<CallResponse, TransportError> {
        let mut builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest { model, messages });
        if let Some(id) = correlation_id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_send_error(model, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(model, status.as_u16(), retry_after, &body));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            TransportError::unavailable(model, format!("malformed response: {}", e))
        })?;

        if let Some(err) = chat.error {
            return Err(TransportError::unavailable(model, err.message));
        }

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::unavailable(model, "response had no choices"))?;

        Ok(CallResponse {
            text: choice.message.content.unwrap_or_default(),
            model_used: chat.model.unwrap_or_else(|| model.to_string()),
        })
    }
}

fn classify_send_error(model: &str, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(model, err.to_string())
    } else if err.is_builder() {
        TransportError::invalid_request(model, err.to_string())
    } else {
        TransportError::unavailable(model, err.to_string())
    }
}

/// Map a non-success HTTP status to a transport category.
pub fn classify_status(
    model: &str,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> TransportError {
    let message = format!("HTTP {}: {}", status, truncate(body.trim(), MAX_ERROR_BODY));
    match status {
        429 => TransportError::rate_limited(model, retry_after, message),
        408 => TransportError::timeout(model, message),
        500..=599 => TransportError::unavailable(model, message),
        _ => TransportError::invalid_request(model, message),
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values, negative numbers
/// and values too large for a [`Duration`] are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

//! Transport layer for individual text-generation calls.
//!
//! ```text
//! Grammar / Detector / Synthesis
//!        │  CallRequest
//!        ▼
//! ResilientTransport ── FallbackLadder (primary → fallbacks)
//!        │                 └─ per model: RateLimiter → retry/backoff
//!        ▼
//! ChatBackend (OpenRouterBackend) ── one HTTP attempt
//! ```
//!
//! The transport knows nothing about rounds, seats or grammars. All failures
//! leave this layer as one of the four [`TransportError`] categories.

pub mod openrouter;
pub mod rate_limit;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TransportError;

pub use openrouter::OpenRouterBackend;
pub use rate_limit::RateLimiter;
pub use retry::{FallbackLadder, ResilientTransport, RetryPolicy};

/// Speaker of a message turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One role-tagged message turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single logical call. Ephemeral; one per external request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Alternative models, tried in order when `model` is exhausted.
    pub fallback: Vec<String>,
    pub correlation_id: Option<String>,
}

impl CallRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            fallback: Vec::new(),
            correlation_id: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Vec<String>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// The last segment of the correlation id (`run:r2:creative` → `creative`).
    pub fn call_label(&self) -> Option<&str> {
        self.correlation_id
            .as_deref()
            .and_then(|id| id.rsplit(':').next())
    }
}

/// Text produced by a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub text: String,
    /// Model that actually answered (may differ from the requested one).
    pub model_used: String,
}

/// Full-featured call: retries, fallback and rate limiting included.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: CallRequest) -> Result<CallResponse, TransportError>;
}

/// Exactly one attempt against exactly one model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        correlation_id: Option<&str>,
    ) -> Result<CallResponse, TransportError>;
}

//! Retry with exponential backoff, model fallback, and shared timeout budget.
//!
//! For one [`CallRequest`]:
//!
//! 1. Build a [`FallbackLadder`]: requested model, then the caller's fallback
//!    list, deduplicated.
//! 2. For each model on the ladder, make up to `max_attempts` attempts. Each
//!    attempt waits for a rate-limit permit and runs under its own timeout.
//! 3. `InvalidRequest` returns immediately; it is never retried and never
//!    falls back. Transient failures back off and retry, and once a model is
//!    exhausted the next model is tried.
//! 4. The whole walk runs under one overall call timeout. Fallback models
//!    share that budget rather than getting a fresh one.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::{FailureCategory, TransportError};
use crate::settings::TransportSettings;
use crate::transport::rate_limit::RateLimiter;
use crate::transport::{CallRequest, CallResponse, ChatBackend, Transport};

/// Ordered list of models to try for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackLadder {
    models: Vec<String>,
}

impl FallbackLadder {
    /// Primary first, then fallbacks in order. Blank and repeated ids are dropped.
    pub fn new(primary: &str, fallbacks: &[String]) -> Self {
        let mut models: Vec<String> = Vec::with_capacity(fallbacks.len() + 1);
        for model in std::iter::once(primary).chain(fallbacks.iter().map(String::as_str)) {
            let model = model.trim();
            if !model.is_empty() && !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        Self { models }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per model, first attempt included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomized in each direction, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&TransportSettings::default())
    }
}

impl From<&TransportSettings> for RetryPolicy {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: settings.jitter.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt `attempt` (1-based),
    /// without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Jittered delay after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        if self.jitter == 0.0 {
            return base;
        }
        let factor = 1.0 - self.jitter + 2.0 * self.jitter * fastrand::f64();
        base.mul_f64(factor).min(self.max_delay)
    }
}

/// [`Transport`] over any [`ChatBackend`], adding retry, fallback and limits.
pub struct ResilientTransport<B> {
    backend: B,
    policy: RetryPolicy,
    limiter: RateLimiter,
    attempt_timeout: Duration,
    call_timeout: Duration,
}

impl<B: ChatBackend> ResilientTransport<B> {
    pub fn new(backend: B, settings: &TransportSettings) -> Self {
        Self {
            backend,
            policy: RetryPolicy::from(settings),
            limiter: RateLimiter::new(
                settings.max_concurrent_per_model,
                settings.requests_per_second,
                settings.burst,
            ),
            attempt_timeout: Duration::from_secs(settings.attempt_timeout_secs),
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn walk_ladder(
        &self,
        ladder: &FallbackLadder,
        request: &CallRequest,
    ) -> Result<CallResponse, TransportError> {
        let mut last_error = None;
        for (idx, model) in ladder.models().iter().enumerate() {
            if idx > 0 {
                warn!(
                    model = %model,
                    correlation_id = request.correlation_id.as_deref().unwrap_or("-"),
                    "falling back to next model"
                );
            }
            match self.try_model(model, request).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            TransportError::invalid_request(request.model.clone(), "no model to call")
        }))
    }

    async fn try_model(
        &self,
        model: &str,
        request: &CallRequest,
    ) -> Result<CallResponse, TransportError> {
        let correlation_id = request.correlation_id.as_deref();
        let mut attempt = 1;
        loop {
            let permit = self.limiter.acquire(model).await?;
            debug!(
                model,
                attempt,
                correlation_id = correlation_id.unwrap_or("-"),
                "transport attempt"
            );
            let result = tokio::time::timeout(
                self.attempt_timeout,
                self.backend.complete(model, &request.messages, correlation_id),
            )
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::timeout(
                    model,
                    format!("no response within {}s", self.attempt_timeout.as_secs()),
                ))
            });
            drop(permit);

            let err = match result {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };
            if attempt >= self.policy.max_attempts {
                warn!(model, attempt, error = %err, "retries exhausted");
                return Err(err);
            }

            // A server hint is honored up to the whole call budget.
            let delay = match err.retry_after() {
                Some(hint) => hint.min(self.call_timeout),
                None => self.policy.delay_for(attempt),
            };
            if err.category() == FailureCategory::RateLimited {
                self.limiter.penalize(model, delay).await;
            }
            warn!(
                model,
                attempt,
                category = %err.category(),
                delay_ms = delay.as_millis() as u64,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl<B: ChatBackend> Transport for ResilientTransport<B> {
    async fn send(&self, request: CallRequest) -> Result<CallResponse, TransportError> {
        let ladder = FallbackLadder::new(&request.model, &request.fallback);
        match tokio::time::timeout(self.call_timeout, self.walk_ladder(&ladder, &request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(
                request.model.clone(),
                format!("call budget of {}s exhausted", self.call_timeout.as_secs()),
            )),
        }
    }
}

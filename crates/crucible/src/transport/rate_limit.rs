//! Local per-model rate limiting.
//!
//! Each model id gets one [`ModelGate`]: a concurrency ceiling (semaphore)
//! plus a token bucket. The bucket is the only state shared between
//! concurrent calls, and it sits behind its own mutex.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::TransportError;

/// Upper bound on any single wait the limiter imposes.
pub const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Classic token bucket with an optional hard block window.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

impl TokenBucket {
    fn new(refill_per_sec: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
            blocked_until: None,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long to wait before retrying.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        if let Some(until) = self.blocked_until {
            if now < until {
                return Err(until - now);
            }
            self.blocked_until = None;
        }
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - self.tokens;
        let wait = Duration::try_from_secs_f64(missing / self.refill_per_sec).unwrap_or(MAX_WAIT);
        Err(wait.min(MAX_WAIT))
    }

    /// Block the bucket for `wait` (at most [`MAX_WAIT`]) and drain it.
    fn penalize(&mut self, now: Instant, wait: Duration) {
        let until = now.checked_add(wait.min(MAX_WAIT)).unwrap_or(now);
        self.blocked_until = Some(self.blocked_until.map_or(until, |b| b.max(until)));
        self.tokens = 0.0;
        self.last_refill = until;
    }
}

/// Limits applied to one model id.
#[derive(Debug)]
struct ModelGate {
    concurrency: Arc<Semaphore>,
    bucket: Mutex<TokenBucket>,
}

/// Held for the duration of one attempt; releases the concurrency slot on drop.
#[derive(Debug)]
pub struct RatePermit {
    _slot: OwnedSemaphorePermit,
}

/// Per-model token buckets and concurrency ceilings, created lazily.
#[derive(Debug)]
pub struct RateLimiter {
    gates: Mutex<HashMap<String, Arc<ModelGate>>>,
    max_concurrent: usize,
    refill_per_sec: f64,
    burst: u32,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, refill_per_sec: f64, burst: u32) -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
            max_concurrent: max_concurrent.max(1),
            refill_per_sec: refill_per_sec.max(f64::MIN_POSITIVE),
            burst,
        }
    }

    async fn gate(&self, model: &str) -> Arc<ModelGate> {
        let mut gates = self.gates.lock().await;
        gates
            .entry(model.to_string())
            .or_insert_with(|| {
                Arc::new(ModelGate {
                    concurrency: Arc::new(Semaphore::new(self.max_concurrent)),
                    bucket: Mutex::new(TokenBucket::new(self.refill_per_sec, self.burst)),
                })
            })
            .clone()
    }

    /// Wait for a concurrency slot and a token for `model`.
    pub async fn acquire(&self, model: &str) -> Result<RatePermit, TransportError> {
        let gate = self.gate(model).await;
        let slot = gate
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::unavailable(model, "rate limiter closed"))?;

        loop {
            let wait = {
                let mut bucket = gate.bucket.lock().await;
                match bucket.try_take(Instant::now()) {
                    Ok(()) => break,
                    Err(wait) => wait,
                }
            };
            debug!(model, wait_ms = wait.as_millis() as u64, "waiting for rate-limit token");
            tokio::time::sleep(wait).await;
        }

        Ok(RatePermit { _slot: slot })
    }

    /// Hold back every call to `model` for `wait`, e.g. after an upstream 429.
    pub async fn penalize(&self, model: &str, wait: Duration) {
        warn!(model, wait_ms = wait.as_millis() as u64, "rate-limit penalty applied");
        let gate = self.gate(model).await;
        gate.bucket.lock().await.penalize(Instant::now(), wait);
    }

    /// Free concurrency slots for `model` right now.
    pub async fn available_slots(&self, model: &str) -> usize {
        self.gate(model).await.concurrency.available_permits()
    }
}

//! Engine settings: endpoint, models, transport limits, observability.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variables (`CRUCIBLE_*`; the API key also from `OPENROUTER_KEY`)
//! 2. A TOML settings file, when one is given
//! 3. Built-in defaults
//!
//! One `EngineSettings` value is owned by one [`crate::Engine`]; nothing here
//! is process-global.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use council::{CouncilConfig, Grammar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openrouter/auto";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_JITTER: f64 = 0.2;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 180;
const DEFAULT_MAX_CONCURRENT_PER_MODEL: usize = 4;
const DEFAULT_REQUESTS_PER_SECOND: f64 = 5.0;
const DEFAULT_BURST: u32 = 10;

const ENV_OPENROUTER_KEY: &str = "OPENROUTER_KEY";
const ENV_API_KEY: &str = "CRUCIBLE_API_KEY";
const ENV_BASE_URL: &str = "CRUCIBLE_BASE_URL";
const ENV_DEFAULT_MODEL: &str = "CRUCIBLE_DEFAULT_MODEL";
const ENV_JUDGE_MODEL: &str = "CRUCIBLE_JUDGE_MODEL";
const ENV_SYNTHESIS_MODEL: &str = "CRUCIBLE_SYNTHESIS_MODEL";
const ENV_FALLBACK_MODELS: &str = "CRUCIBLE_FALLBACK_MODELS";
const ENV_TRACE_ROUNDS: &str = "CRUCIBLE_TRACE_ROUNDS";
const ENV_ROUND_TIMEOUT_SECS: &str = "CRUCIBLE_ROUND_TIMEOUT_SECS";
const ENV_MAX_ATTEMPTS: &str = "CRUCIBLE_MAX_ATTEMPTS";
const ENV_CALL_TIMEOUT_SECS: &str = "CRUCIBLE_CALL_TIMEOUT_SECS";
const ENV_ATTEMPT_TIMEOUT_SECS: &str = "CRUCIBLE_ATTEMPT_TIMEOUT_SECS";
const ENV_MAX_CONCURRENT: &str = "CRUCIBLE_MAX_CONCURRENT_PER_MODEL";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("no API key configured (set OPENROUTER_KEY or CRUCIBLE_API_KEY)")]
    MissingApiKey,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Retry, timeout and rate-limit knobs for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Attempts per model, first attempt included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Backoff randomization fraction in `[0, 1]`.
    pub jitter: f64,
    /// Timeout for a single HTTP attempt.
    pub attempt_timeout_secs: u64,
    /// Budget for one logical call, across every retry and fallback model.
    pub call_timeout_secs: u64,
    pub max_concurrent_per_model: usize,
    pub requests_per_second: f64,
    pub burst: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: DEFAULT_JITTER,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            max_concurrent_per_model: DEFAULT_MAX_CONCURRENT_PER_MODEL,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst: DEFAULT_BURST,
        }
    }
}

impl TransportSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |field, reason: &str| SettingsError::Invalid {
            field,
            reason: reason.to_string(),
        };
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be > 0"));
        }
        if self.max_concurrent_per_model == 0 {
            return Err(invalid("max_concurrent_per_model", "must be > 0"));
        }
        if !(self.requests_per_second > 0.0 && self.requests_per_second.is_finite()) {
            return Err(invalid("requests_per_second", "must be a positive number"));
        }
        if self.burst == 0 {
            return Err(invalid("burst", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(invalid("jitter", "must be in [0, 1]"));
        }
        if self.attempt_timeout_secs == 0 || self.call_timeout_secs == 0 {
            return Err(invalid("timeouts", "must be > 0"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid("base_delay_ms", "must not exceed max_delay_ms"));
        }
        Ok(())
    }
}

/// Everything an [`crate::Engine`] needs, injected at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    /// Used when neither a seat hint nor the router picks a model.
    pub default_model: String,
    /// Model for the convergence judge.
    pub judge_model: String,
    /// Model for synthesis; `default_model` when unset.
    pub synthesis_model: Option<String>,
    /// Tried in order after a call's primary model is exhausted.
    pub fallback_models: Vec<String>,
    /// Retain every round snapshot in the run result.
    pub trace_rounds: bool,
    /// Explicit round budget; derived from the council when unset.
    pub round_timeout_secs: Option<u64>,
    pub transport: TransportSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            judge_model: DEFAULT_MODEL.to_string(),
            synthesis_model: None,
            fallback_models: Vec::new(),
            trace_rounds: false,
            round_timeout_secs: None,
            transport: TransportSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        settings.apply_env()?;
        Ok(settings)
    }

    /// Parse a TOML settings file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// File (if any) then environment, validated.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self) -> Result<(), SettingsError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Overlay values from `lookup`; blank values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY).or_else(|| get(ENV_OPENROUTER_KEY)) {
            self.api_key = key;
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(model) = get(ENV_DEFAULT_MODEL) {
            self.default_model = model;
        }
        if let Some(model) = get(ENV_JUDGE_MODEL) {
            self.judge_model = model;
        }
        if let Some(model) = get(ENV_SYNTHESIS_MODEL) {
            self.synthesis_model = Some(model);
        }
        if let Some(list) = get(ENV_FALLBACK_MODELS) {
            self.fallback_models = list
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = get(ENV_TRACE_ROUNDS) {
            self.trace_rounds = parse_bool(ENV_TRACE_ROUNDS, &raw)?;
        }
        if let Some(raw) = get(ENV_ROUND_TIMEOUT_SECS) {
            self.round_timeout_secs = Some(parse_num(ENV_ROUND_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = get(ENV_MAX_ATTEMPTS) {
            self.transport.max_attempts = parse_num(ENV_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = get(ENV_CALL_TIMEOUT_SECS) {
            self.transport.call_timeout_secs = parse_num(ENV_CALL_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_ATTEMPT_TIMEOUT_SECS) {
            self.transport.attempt_timeout_secs = parse_num(ENV_ATTEMPT_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_MAX_CONCURRENT) {
            self.transport.max_concurrent_per_model = parse_num(ENV_MAX_CONCURRENT, &raw)?;
        }
        Ok(())
    }

    /// Checks everything except the API key, which only the HTTP backend needs.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.default_model.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "default_model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.judge_model.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "judge_model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.round_timeout_secs == Some(0) {
            return Err(SettingsError::Invalid {
                field: "round_timeout_secs",
                reason: "must be > 0".to_string(),
            });
        }
        self.transport.validate()
    }

    pub fn synthesis_model(&self) -> &str {
        self.synthesis_model.as_deref().unwrap_or(&self.default_model)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.call_timeout_secs)
    }

    /// Time allowed for one round of `config`.
    ///
    /// Without an explicit value this is the per-call budget times the number
    /// of serialized transport waits in a round, judge call included.
    pub fn round_timeout(&self, config: &CouncilConfig) -> Duration {
        match self.round_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => {
                let seats = config.deliberating_seats().len() as u32;
                self.call_timeout() * sequential_phases(config.grammar, seats)
            }
        }
    }
}

/// Serialized transport waits in one round of `grammar` with `seats`
/// deliberating seats, including the delta-detector call.
pub fn sequential_phases(grammar: Grammar, seats: u32) -> u32 {
    match grammar {
        // concurrent positions, critique, judge
        Grammar::FanOut => 3,
        // seat/critique alternation, judge
        Grammar::ChainedDraft => 2 * seats + 1,
        // concurrent positions, critique, concurrent defenses, judge
        Grammar::PositionDefense => 4,
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, SettingsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidEnv {
            var,
            value: raw.to_string(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, SettingsError> {
    raw.trim().parse().map_err(|_| SettingsError::InvalidEnv {
        var,
        value: raw.to_string(),
    })
}

//! Council configuration as received from the classifier.
//!
//! The classifier emits a loosely shaped JSON object. [`CouncilConfig::from_json`]
//! maps it onto explicit value structs and runs [`CouncilConfig::validate`];
//! there is no partial acceptance and no repair. The engine validates again
//! at its own boundary, so programmatically built configs get the same checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::roles::{Complexity, CritiqueStyle, Grammar, Role};

/// Smallest and largest council, adversarial seat included.
pub const MIN_SEATS: usize = 3;
pub const MAX_SEATS: usize = 5;

/// Inclusive bounds on the round budget.
pub const MIN_ROUNDS: u32 = 2;
pub const MAX_ROUNDS: u32 = 5;

/// Invariant violations detected in a council configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("council must have {min}-{max} seats, got {count}")]
    SeatCount { count: usize, min: usize, max: usize },

    #[error("council must have exactly one adversarial seat, got {count}")]
    AdversaryCount { count: usize },

    #[error("round budget must be {min}-{max}, got {budget}")]
    RoundBudget { budget: u32, min: u32, max: u32 },

    #[error("short-circuit requires simple complexity, got {complexity}")]
    ShortCircuitComplexity { complexity: Complexity },

    #[error("deliberating role {role} appears more than once")]
    DuplicateRole { role: Role },

    #[error("seat {role} has an empty system prompt")]
    EmptySystemPrompt { role: Role },

    #[error("malformed council configuration: {0}")]
    Malformed(String),
}

/// One configured participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSpec {
    pub role: Role,
    pub system_prompt: String,
    /// Preferred model id, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
}

impl SeatSpec {
    pub fn new(role: Role, system_prompt: impl Into<String>) -> Self {
        Self {
            role,
            system_prompt: system_prompt.into(),
            model_hint: None,
        }
    }

    pub fn with_model_hint(mut self, model: impl Into<String>) -> Self {
        self.model_hint = Some(model.into());
        self
    }
}

/// Validated-before-use council configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Seats in configuration order; this order keys every response mapping.
    #[serde(alias = "council")]
    pub seats: Vec<SeatSpec>,
    #[serde(alias = "loop_grammar")]
    pub grammar: Grammar,
    #[serde(alias = "loop_count")]
    pub round_budget: u32,
    #[serde(default = "default_true")]
    pub allow_early_exit: bool,
    #[serde(alias = "red_team_flavor")]
    pub critique_style: CritiqueStyle,
    pub synthesis_instruction: String,
    pub complexity: Complexity,
    #[serde(default)]
    pub short_circuit_allowed: bool,
}

fn default_true() -> bool {
    true
}

impl CouncilConfig {
    /// Parse the classifier's JSON output and validate it.
    ///
    /// Tolerates a surrounding markdown code fence. Unknown selector values
    /// and missing fields are reported as [`ConfigError::Malformed`].
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let text = strip_code_fence(raw);
        let config: CouncilConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant; the first violation wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let count = self.seats.len();
        if !(MIN_SEATS..=MAX_SEATS).contains(&count) {
            return Err(ConfigError::SeatCount {
                count,
                min: MIN_SEATS,
                max: MAX_SEATS,
            });
        }

        let adversaries = self.seats.iter().filter(|s| s.role.is_adversarial()).count();
        if adversaries != 1 {
            return Err(ConfigError::AdversaryCount { count: adversaries });
        }

        if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&self.round_budget) {
            return Err(ConfigError::RoundBudget {
                budget: self.round_budget,
                min: MIN_ROUNDS,
                max: MAX_ROUNDS,
            });
        }

        if self.short_circuit_allowed && self.complexity != Complexity::Simple {
            return Err(ConfigError::ShortCircuitComplexity {
                complexity: self.complexity,
            });
        }

        let mut seen: Vec<Role> = Vec::with_capacity(count);
        for seat in &self.seats {
            if seat.system_prompt.trim().is_empty() {
                return Err(ConfigError::EmptySystemPrompt { role: seat.role });
            }
            if seen.contains(&seat.role) {
                return Err(ConfigError::DuplicateRole { role: seat.role });
            }
            seen.push(seat.role);
        }

        Ok(())
    }

    /// Whether the run may bypass the council entirely.
    pub fn short_circuits(&self) -> bool {
        self.short_circuit_allowed && self.complexity == Complexity::Simple
    }

    /// Deliberating seats in configuration order.
    pub fn deliberating_seats(&self) -> Vec<&SeatSpec> {
        self.seats
            .iter()
            .filter(|s| !s.role.is_adversarial())
            .collect()
    }

    /// The adversarial seat, if the configuration has one.
    pub fn adversary(&self) -> Option<&SeatSpec> {
        self.seats.iter().find(|s| s.role.is_adversarial())
    }

    /// Deliberating roles in configuration order.
    pub fn deliberating_roles(&self) -> Vec<Role> {
        self.deliberating_seats().iter().map(|s| s.role).collect()
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

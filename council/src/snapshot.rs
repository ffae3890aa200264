//! Round snapshots and the externally visible run result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// One deliberating seat's text for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatResponse {
    pub role: Role,
    pub text: String,
}

/// Ordered role → response mapping.
///
/// Order is configuration order, never completion order. Keys are unique;
/// [`SeatResponses::insert`] replaces an existing entry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatResponses(Vec<SeatResponse>);

impl SeatResponses {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace the response for `role`, keeping its original slot.
    pub fn insert(&mut self, role: Role, text: impl Into<String>) {
        let text = text.into();
        match self.0.iter_mut().find(|r| r.role == role) {
            Some(existing) => existing.text = text,
            None => self.0.push(SeatResponse { role, text }),
        }
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        self.0
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.text.as_str())
    }

    pub fn roles(&self) -> Vec<Role> {
        self.0.iter().map(|r| r.role).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &str)> {
        self.0.iter().map(|r| (r.role, r.text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Role, String)> for SeatResponses {
    fn from_iter<I: IntoIterator<Item = (Role, String)>>(iter: I) -> Self {
        let mut responses = SeatResponses::new();
        for (role, text) in iter {
            responses.insert(role, text);
        }
        responses
    }
}

/// The model that actually answered one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatModel {
    pub role: Role,
    pub model: String,
}

/// Ordered role → answering-model mapping, kept alongside [`SeatResponses`].
///
/// With fallback enabled this can differ from the model a seat asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatModels(Vec<SeatModel>);

impl SeatModels {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace the model for `role`, keeping its original slot.
    pub fn insert(&mut self, role: Role, model: impl Into<String>) {
        let model = model.into();
        match self.0.iter_mut().find(|m| m.role == role) {
            Some(existing) => existing.model = model,
            None => self.0.push(SeatModel { role, model }),
        }
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        self.0
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.model.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &str)> {
        self.0.iter().map(|m| (m.role, m.model.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Record of one completed round. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Round number (1-indexed).
    pub round: u32,
    /// Deliberating seat responses, in configuration order.
    pub responses: SeatResponses,
    /// Model that answered each seat, in configuration order.
    #[serde(default)]
    pub models_used: SeatModels,
    /// The adversarial seat's critique for this round.
    pub critique: String,
    /// Model that produced `critique`.
    #[serde(default)]
    pub critique_model: String,
    /// Whether the delta detector saw a material change.
    pub material_change: bool,
    /// Wall-clock duration of the round in milliseconds.
    pub duration_ms: u64,
    /// When the round completed.
    pub completed_at: DateTime<Utc>,
}

/// Outcome of a run.
///
/// `reasoning_trace` is `None` when round tracing was disabled and is then
/// omitted from serialized output entirely; when tracing is enabled it holds
/// one snapshot per executed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub final_response: String,
    pub loops_executed: u32,
    pub early_exit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_trace: Option<Vec<RoundSnapshot>>,
}

impl RunResult {
    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let status = if self.loops_executed == 0 {
            "SHORT-CIRCUIT"
        } else if self.early_exit {
            "CONVERGED"
        } else {
            "EXHAUSTED"
        };
        format!(
            "[{}] {} rounds | trace={}",
            status,
            self.loops_executed,
            self.reasoning_trace.as_ref().map_or(0, |t| t.len())
        )
    }
}

//! Per-call model resolution.
//!
//! Priority, highest first:
//!
//! 1. the seat's own `model_hint`
//! 2. the engine's [`ModelRouter`], if one is installed
//! 3. the engine's default model
//!
//! Routers are deterministic configuration; nothing here learns.

use std::collections::HashMap;

use council::{Role, SeatSpec};

/// Picks a model for a seat. `None` defers to the next priority level.
pub trait ModelRouter: Send + Sync {
    fn select(&self, role: Role, round: u32, seat_index: usize) -> Option<String>;
}

/// Fixed role → ordered model list; the first listed model wins.
#[derive(Debug, Clone, Default)]
pub struct StaticRouter {
    by_role: HashMap<Role, Vec<String>>,
}

impl StaticRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role, models: Vec<String>) -> Self {
        self.by_role.insert(role, models);
        self
    }
}

impl ModelRouter for StaticRouter {
    fn select(&self, role: Role, _round: u32, _seat_index: usize) -> Option<String> {
        self.by_role
            .get(&role)?
            .iter()
            .find(|m| !m.trim().is_empty())
            .cloned()
    }
}

/// Premium model for the adversarial and synthesizer roles, budget model
/// for everyone else.
#[derive(Debug, Clone)]
pub struct TieredRouter {
    premium: String,
    budget: String,
}

impl TieredRouter {
    pub fn new(premium: impl Into<String>, budget: impl Into<String>) -> Self {
        Self {
            premium: premium.into(),
            budget: budget.into(),
        }
    }
}

impl ModelRouter for TieredRouter {
    fn select(&self, role: Role, _round: u32, _seat_index: usize) -> Option<String> {
        let model = match role {
            Role::RedTeam | Role::Synthesizer => &self.premium,
            _ => &self.budget,
        };
        non_blank(model)
    }
}

/// Resolve the model for `seat` in `round`.
pub fn resolve_model(
    seat: &SeatSpec,
    router: Option<&dyn ModelRouter>,
    round: u32,
    seat_index: usize,
    default_model: &str,
) -> String {
    seat.model_hint
        .as_deref()
        .and_then(non_blank)
        .or_else(|| router.and_then(|r| r.select(seat.role, round, seat_index)))
        .unwrap_or_else(|| default_model.to_string())
}

fn non_blank(model: &str) -> Option<String> {
    let model = model.trim();
    (!model.is_empty()).then(|| model.to_string())
}

//! Closed selector sets handed over by the classifier.
//!
//! Every selector is a plain `Copy` enum with a snake_case wire form, so a
//! configuration that names an unknown role or grammar fails to deserialize
//! instead of being silently coerced.

use serde::{Deserialize, Serialize};

/// Role of a council seat.
///
/// Exactly one seat per council carries [`Role::RedTeam`], the adversarial
/// role. All other roles are deliberating roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Integration, coherence, combining perspectives.
    Synthesizer,
    /// Deep knowledge in the relevant field.
    DomainExpert,
    /// Implementation focus, feasibility, resource constraints.
    Pragmatist,
    /// Novel approaches and lateral alternatives.
    Creative,
    /// Adversarial critique.
    RedTeam,
}

impl Role {
    /// All roles in declaration order.
    pub fn all() -> &'static [Role] {
        &[
            Self::Synthesizer,
            Self::DomainExpert,
            Self::Pragmatist,
            Self::Creative,
            Self::RedTeam,
        ]
    }

    /// Whether this is the adversarial role.
    pub fn is_adversarial(self) -> bool {
        self == Self::RedTeam
    }

    /// Snake-case identifier, identical to the serde form.
    pub fn id(self) -> &'static str {
        match self {
            Self::Synthesizer => "synthesizer",
            Self::DomainExpert => "domain_expert",
            Self::Pragmatist => "pragmatist",
            Self::Creative => "creative",
            Self::RedTeam => "red_team",
        }
    }

    /// Upper-case label used when positions are shown to other seats.
    pub fn label(self) -> &'static str {
        match self {
            Self::Synthesizer => "SYNTHESIZER",
            Self::DomainExpert => "DOMAIN_EXPERT",
            Self::Pragmatist => "PRAGMATIST",
            Self::Creative => "CREATIVE",
            Self::RedTeam => "RED_TEAM",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Role::all()
            .iter()
            .copied()
            .find(|r| r.id() == normalized)
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

/// Interaction topology for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    /// All seats respond concurrently, then the adversary critiques the set.
    #[serde(alias = "parallel")]
    FanOut,
    /// Seats revise one shared draft in order, critiqued after each step.
    #[serde(alias = "sequential")]
    ChainedDraft,
    /// Concurrent positions, targeted critique, then targeted defenses.
    #[serde(alias = "debate")]
    PositionDefense,
}

impl std::fmt::Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FanOut => write!(f, "fan_out"),
            Self::ChainedDraft => write!(f, "chained_draft"),
            Self::PositionDefense => write!(f, "position_defense"),
        }
    }
}

/// Attack vector the adversarial seat is asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueStyle {
    /// Reasoning validity.
    Logical,
    /// Implementation reality.
    Feasibility,
    /// Values and consequences.
    Ethical,
    /// The opposition's strongest case.
    Steelman,
}

impl std::fmt::Display for CritiqueStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logical => write!(f, "logical"),
            Self::Feasibility => write!(f, "feasibility"),
            Self::Ethical => write!(f, "ethical"),
            Self::Steelman => write!(f, "steelman"),
        }
    }
}

/// Classification tier assigned to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Clear cause and effect; the only tier eligible for short-circuit.
    Simple,
    Complicated,
    Complex,
    Chaotic,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Complicated => write!(f, "complicated"),
            Self::Complex => write!(f, "complex"),
            Self::Chaotic => write!(f, "chaotic"),
        }
    }
}

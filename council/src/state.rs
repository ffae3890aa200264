//! Run-phase state machine: phases, transitions and the transition ledger.
//!
//! ```text
//! NotStarted ─┬─────────────────────────────────────────→ Synthesizing → Done
//!             │  (short-circuit)                              ↑
//!             └→ Running(1) → Running(2) → … ─┬→ Converged ───┤
//!                                             └→ Exhausted ───┘
//!
//! any non-terminal phase ──→ Failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "round")]
pub enum RunPhase {
    /// Run created, no call issued yet.
    NotStarted,
    /// Executing the given round (1-indexed).
    Running(u32),
    /// Delta detector reported no material change at round ≥ 2.
    Converged,
    /// Round budget consumed without convergence.
    Exhausted,
    /// Final synthesis call in flight.
    Synthesizing,
    /// Final response produced.
    Done,
    /// Unrecoverable failure.
    Failed,
}

impl RunPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition_to(self, to: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == Self::Failed {
            return true;
        }
        match (self, to) {
            (Self::NotStarted, Self::Running(1)) => true,
            (Self::NotStarted, Self::Synthesizing) => true,
            (Self::Running(k), Self::Running(next)) => next == k + 1,
            (Self::Running(k), Self::Converged) => k >= 2,
            (Self::Running(_), Self::Exhausted) => true,
            (Self::Converged | Self::Exhausted, Self::Synthesizing) => true,
            (Self::Synthesizing, Self::Done) => true,
            _ => false,
        }
    }

    /// Current round, if running.
    pub fn round(self) -> Option<u32> {
        match self {
            Self::Running(k) => Some(k),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running(k) => write!(f, "running({})", k),
            Self::Converged => write!(f, "converged"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A recorded phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RunPhase,
    pub to: RunPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for illegal transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} → {to}")]
pub struct TransitionError {
    pub from: RunPhase,
    pub to: RunPhase,
}

/// Tracks the current phase and every transition taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    phase: RunPhase,
    transitions: Vec<PhaseTransition>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::NotStarted,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Move to `to`, recording the reason.
    pub fn transition(&mut self, to: RunPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }
        tracing::debug!(from = %self.phase, to = %to, reason, "run phase transition");
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Move to `Failed` from any non-terminal phase. No-op once terminal.
    pub fn fail(&mut self, reason: &str) {
        if self.phase.is_terminal() {
            return;
        }
        // Failed is reachable from every non-terminal phase.
        let _ = self.transition(RunPhase::Failed, reason);
    }

    /// Number of rounds entered so far.
    pub fn rounds_entered(&self) -> u32 {
        self.transitions
            .iter()
            .filter_map(|t| t.to.round())
            .max()
            .unwrap_or(0)
    }
}

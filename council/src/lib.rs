//! Council domain model
//!
//! Deterministic building blocks for multi-round adversarial deliberation.
//! Nothing in this crate performs I/O; the async engine lives in `crucible`.
//!
//! # Contents
//!
//! - [`roles`]: seat roles and the closed selector sets (grammar, critique
//!   style, complexity tier)
//! - [`config`]: seat specs and the validated council configuration
//! - [`snapshot`]: ordered seat responses, round snapshots, run results
//! - [`state`]: run-phase state machine with a transition ledger
//! - [`critique`]: adversarial framings per critique style
//! - [`targeting`]: weakest-seat extraction from a critique
//! - [`transcript`]: text renderings of positions and rounds

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod critique;
pub mod roles;
pub mod snapshot;
pub mod state;
pub mod targeting;
pub mod transcript;

pub use config::{
    ConfigError, CouncilConfig, SeatSpec, MAX_ROUNDS, MAX_SEATS, MIN_ROUNDS, MIN_SEATS,
};
pub use roles::{Complexity, CritiqueStyle, Grammar, Role};
pub use snapshot::{
    RoundSnapshot, RunResult, SeatModel, SeatModels, SeatResponse, SeatResponses,
};
pub use state::{PhaseTransition, RunPhase, RunState, TransitionError};

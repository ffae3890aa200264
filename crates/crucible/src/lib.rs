//! Crucible: a multi-round adversarial deliberation engine.
//!
//! Runs a council of model-backed seats through a bounded number of
//! rounds, stops early when positions stop moving, and synthesizes one
//! final answer.
//!
//! ```text
//! CouncilConfig + Deliberation
//!         │
//!         ▼
//!  Engine ─→ RoundController ─→ Grammar (fan-out | chained | defense)
//!                 │                    │
//!                 │                    ▼
//!                 │              Transport (retry, fallback, rate limit)
//!                 ▼
//!          DeltaDetector ─→ Synthesis ─→ RunResult
//! ```
//!
//! The deterministic domain model (roles, configuration, snapshots, phase
//! ledger) lives in the `council` crate and is re-exported here.

#![allow(clippy::uninlined_format_args)]

pub mod delta;
pub mod engine;
pub mod errors;
pub mod routing;
pub mod settings;
pub mod synthesis;
pub mod telemetry;
pub mod transport;

pub(crate) mod controller;
pub(crate) mod grammar;

pub use council;

pub use delta::{DeltaDetector, JudgeDetector, LexicalDetector};
pub use engine::{Deliberation, Engine, EngineBuilder};
pub use errors::{AbortCause, CallSite, ErrorKind, FailureCategory, RunError, TransportError};
pub use routing::{ModelRouter, StaticRouter, TieredRouter};
pub use settings::{EngineSettings, SettingsError, TransportSettings};
pub use transport::{
    CallRequest, CallResponse, ChatBackend, Message, MessageRole, OpenRouterBackend,
    ResilientTransport, Transport,
};

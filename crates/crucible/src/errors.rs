//! Error taxonomy for transport calls and whole runs.
//!
//! Transport failures are normalized into exactly four categories. Only the
//! transient ones are retried, and only inside the transport layer; every
//! other failure propagates unchanged to the caller as a [`RunError`].
//!
//! | Category         | Transient | Surfaces as                         |
//! |------------------|-----------|-------------------------------------|
//! | RateLimited      | yes       | `RoundAborted` / `SynthesisFailed`  |
//! | Unavailable      | yes       | `RoundAborted` / `SynthesisFailed`  |
//! | Timeout          | yes       | `RoundAborted` / `SynthesisFailed`  |
//! | InvalidRequest   | no        | `TransportPermanent`                |

use std::fmt;
use std::time::Duration;

use council::{ConfigError, Role, TransitionError};
use thiserror::Error;

// ── Transport ────────────────────────────────────────────────────────────────

/// Normalized category of a failed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    RateLimited,
    Unavailable,
    InvalidRequest,
    Timeout,
}

impl FailureCategory {
    /// Whether the transport may retry or fall back after this failure.
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::InvalidRequest)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A failed call against the brokering endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("rate limited by {model}: {message}")]
    RateLimited {
        model: String,
        /// Wait hint from the upstream, when one was given.
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("{model} unavailable: {message}")]
    Unavailable { model: String, message: String },

    #[error("invalid request to {model}: {message}")]
    InvalidRequest { model: String, message: String },

    #[error("{model} timed out: {message}")]
    Timeout { model: String, message: String },
}

impl TransportError {
    pub fn rate_limited(
        model: impl Into<String>,
        retry_after: Option<Duration>,
        message: impl Into<String>,
    ) -> Self {
        Self::RateLimited {
            model: model.into(),
            retry_after,
            message: message.into(),
        }
    }

    pub fn unavailable(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn timeout(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            Self::RateLimited { .. } => FailureCategory::RateLimited,
            Self::Unavailable { .. } => FailureCategory::Unavailable,
            Self::InvalidRequest { .. } => FailureCategory::InvalidRequest,
            Self::Timeout { .. } => FailureCategory::Timeout,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category().is_transient()
    }

    /// Model the failure was observed against.
    pub fn model(&self) -> &str {
        match self {
            Self::RateLimited { model, .. }
            | Self::Unavailable { model, .. }
            | Self::InvalidRequest { model, .. }
            | Self::Timeout { model, .. } => model,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

// ── Run ──────────────────────────────────────────────────────────────────────

/// Which call inside a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    /// A deliberating seat.
    Seat(Role),
    /// The adversarial seat.
    Critique,
    /// The convergence judge.
    Judge,
    /// The final synthesis call.
    Synthesis,
}

impl CallSite {
    /// Short label used in correlation ids and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Seat(role) => role.id(),
            Self::Critique => "red_team",
            Self::Judge => "judge",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Why a round was aborted.
#[derive(Debug, Error)]
pub enum AbortCause {
    #[error("{site} call failed: {source}")]
    Call {
        site: CallSite,
        #[source]
        source: TransportError,
    },

    #[error("round exceeded its {}s budget", .after.as_secs())]
    Timeout { after: Duration },

    #[error("seat task failed: {0}")]
    TaskFailed(String),
}

/// Flat run-level category for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationInvalid,
    TransportPermanent,
    RoundAborted,
    SynthesisFailed,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationInvalid => write!(f, "configuration_invalid"),
            Self::TransportPermanent => write!(f, "transport_permanent"),
            Self::RoundAborted => write!(f, "round_aborted"),
            Self::SynthesisFailed => write!(f, "synthesis_failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Terminal failure of a run. A failed run never yields a `RunResult`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(#[from] ConfigError),

    #[error("permanent transport failure at {site}: {source}")]
    TransportPermanent {
        site: CallSite,
        #[source]
        source: TransportError,
    },

    #[error("round {round} aborted: {cause}")]
    RoundAborted {
        round: u32,
        #[source]
        cause: AbortCause,
    },

    #[error("synthesis failed: {source}")]
    SynthesisFailed {
        #[source]
        source: TransportError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationInvalid(_) => ErrorKind::ConfigurationInvalid,
            Self::TransportPermanent { .. } => ErrorKind::TransportPermanent,
            Self::RoundAborted { .. } => ErrorKind::RoundAborted,
            Self::SynthesisFailed { .. } => ErrorKind::SynthesisFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<TransitionError> for RunError {
    fn from(err: TransitionError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Failure of a single round before it is attributed to a run.
#[derive(Debug)]
pub(crate) enum RoundFailure {
    Call {
        site: CallSite,
        source: TransportError,
    },
    Cancelled,
    TaskFailed(String),
}

impl RoundFailure {
    /// Attribute to round `round`.
    pub(crate) fn into_run_error(self, round: u32) -> RunError {
        match self {
            Self::Call { site, source } if !source.is_transient() => {
                RunError::TransportPermanent { site, source }
            }
            Self::Call { site, source } => RunError::RoundAborted {
                round,
                cause: AbortCause::Call { site, source },
            },
            Self::Cancelled => RunError::Cancelled,
            Self::TaskFailed(msg) => RunError::RoundAborted {
                round,
                cause: AbortCause::TaskFailed(msg),
            },
        }
    }

    /// Attribute to the synthesis step.
    pub(crate) fn into_synthesis_error(self) -> RunError {
        match self {
            Self::Call { site, source } if !source.is_transient() => {
                RunError::TransportPermanent { site, source }
            }
            Self::Call { source, .. } => RunError::SynthesisFailed { source },
            Self::Cancelled => RunError::Cancelled,
            Self::TaskFailed(msg) => RunError::Internal(msg),
        }
    }
}

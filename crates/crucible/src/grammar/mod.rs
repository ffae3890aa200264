//! Grammar strategies: how one round's calls are ordered and assembled.
//!
//! | Grammar          | Seat calls     | Critique calls | Concurrency           |
//! |------------------|----------------|----------------|-----------------------|
//! | FanOut           | n              | 1              | seats concurrent      |
//! | ChainedDraft     | n              | n              | strictly serial       |
//! | PositionDefense  | n + targeted   | 1              | each phase concurrent |
//!
//! Every variant returns exactly one response per deliberating seat, keyed
//! in configuration order, plus exactly one critique. Any failed call fails
//! the whole round; partial output is never returned.

mod chained;
mod defense;
mod fan_out;

use std::sync::Arc;

use council::{
    CouncilConfig, CritiqueStyle, Grammar, Role, RoundSnapshot, SeatModels, SeatResponses,
    SeatSpec,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{CallSite, RoundFailure};
use crate::routing::{resolve_model, ModelRouter};
use crate::transport::{CallRequest, CallResponse, Message, Transport};

/// Issues calls on behalf of one run: model resolution, fallback list,
/// correlation ids and cancellation. Cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct SeatCaller {
    pub transport: Arc<dyn Transport>,
    pub router: Option<Arc<dyn ModelRouter>>,
    pub default_model: String,
    pub fallback: Vec<String>,
    pub run_id: Arc<str>,
    pub cancel: CancellationToken,
}

impl SeatCaller {
    pub fn model_for(&self, seat: &SeatSpec, round: u32, seat_index: usize) -> String {
        resolve_model(
            seat,
            self.router.as_deref(),
            round,
            seat_index,
            &self.default_model,
        )
    }

    /// One call, abandoned as soon as the run is cancelled. The response
    /// names the model that answered, which may be a fallback.
    pub async fn call(
        &self,
        site: CallSite,
        round: u32,
        model: String,
        messages: Vec<Message>,
    ) -> Result<CallResponse, RoundFailure> {
        let correlation_id = format!("{}:r{}:{}", self.run_id, round, site.label());
        debug!(%site, round, model = %model, correlation_id = %correlation_id, "calling");
        let request = CallRequest::new(model, messages)
            .with_fallback(self.fallback.clone())
            .with_correlation_id(correlation_id);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RoundFailure::Cancelled),
            result = self.transport.send(request) => {
                result.map_err(|source| RoundFailure::Call { site, source })
            }
        }
    }
}

/// Everything a grammar needs for one round.
pub(crate) struct RoundContext<'a> {
    pub query: &'a str,
    pub round: u32,
    /// Deliberating seats in configuration order.
    pub seats: Vec<&'a SeatSpec>,
    pub adversary: &'a SeatSpec,
    pub style: CritiqueStyle,
    /// The previous round, if any.
    pub prior: Option<&'a RoundSnapshot>,
    pub caller: &'a SeatCaller,
}

impl<'a> RoundContext<'a> {
    /// Build from a validated config; `None` if it has no adversarial seat.
    pub fn new(
        config: &'a CouncilConfig,
        query: &'a str,
        round: u32,
        prior: Option<&'a RoundSnapshot>,
        caller: &'a SeatCaller,
    ) -> Option<Self> {
        Some(Self {
            query,
            round,
            seats: config.deliberating_seats(),
            adversary: config.adversary()?,
            style: config.critique_style,
            prior,
            caller,
        })
    }

    pub fn roles(&self) -> Vec<Role> {
        self.seats.iter().map(|s| s.role).collect()
    }

    /// Call the adversarial seat with `user` as the request.
    pub async fn critique(&self, user: String) -> Result<CallResponse, RoundFailure> {
        let system = council::critique::adversary_system_prompt(self.adversary, self.style);
        let model = self
            .caller
            .model_for(self.adversary, self.round, self.seats.len());
        self.caller
            .call(
                CallSite::Critique,
                self.round,
                model,
                vec![Message::system(system), Message::user(user)],
            )
            .await
    }

    /// One [`SeatJob`] for `seat` with the given turns after its system prompt.
    pub fn job(&self, index: usize, seat: &SeatSpec, turns: Vec<Message>) -> SeatJob {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(Message::system(seat.system_prompt.clone()));
        messages.extend(turns);
        SeatJob {
            role: seat.role,
            model: self.caller.model_for(seat, self.round, index),
            messages,
        }
    }
}

/// Output of one grammar round.
#[derive(Debug, Clone, Default)]
pub(crate) struct RoundOutput {
    pub responses: SeatResponses,
    pub models_used: SeatModels,
    pub critique: String,
    pub critique_model: String,
}

impl RoundOutput {
    /// Record (or replace) a seat's answer and the model that gave it.
    pub fn record_seat(&mut self, role: Role, answer: CallResponse) {
        self.models_used.insert(role, answer.model_used);
        self.responses.insert(role, answer.text);
    }

    pub fn record_critique(&mut self, answer: CallResponse) {
        self.critique = answer.text;
        self.critique_model = answer.model_used;
    }
}

/// A prepared seat call.
pub(crate) struct SeatJob {
    pub role: Role,
    pub model: String,
    pub messages: Vec<Message>,
}

/// Run `jobs` concurrently and return their answers in job order.
///
/// The first failure aborts every sibling still in flight.
pub(crate) async fn run_concurrent(
    caller: &SeatCaller,
    round: u32,
    jobs: Vec<SeatJob>,
) -> Result<Vec<(Role, CallResponse)>, RoundFailure> {
    let roles: Vec<Role> = jobs.iter().map(|j| j.role).collect();
    let mut slots: Vec<Option<CallResponse>> = vec![None; jobs.len()];
    let mut join_set: JoinSet<(usize, Result<CallResponse, RoundFailure>)> = JoinSet::new();

    for (idx, job) in jobs.into_iter().enumerate() {
        let caller = caller.clone();
        join_set.spawn(async move {
            let result = caller
                .call(CallSite::Seat(job.role), round, job.model, job.messages)
                .await;
            (idx, result)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, Ok(answer))) => slots[idx] = Some(answer),
            Ok((_, Err(failure))) => {
                join_set.abort_all();
                return Err(failure);
            }
            Err(join_err) => {
                join_set.abort_all();
                return Err(RoundFailure::TaskFailed(join_err.to_string()));
            }
        }
    }

    roles
        .into_iter()
        .zip(slots)
        .map(|(role, slot)| {
            slot.map(|answer| (role, answer))
                .ok_or_else(|| RoundFailure::TaskFailed(format!("no response for {}", role)))
        })
        .collect()
}

/// Dispatch one round to the configured grammar.
pub(crate) async fn execute_round(
    grammar: Grammar,
    ctx: &RoundContext<'_>,
) -> Result<RoundOutput, RoundFailure> {
    debug!(%grammar, round = ctx.round, seats = ctx.seats.len(), "executing round");
    match grammar {
        Grammar::FanOut => fan_out::run(ctx).await,
        Grammar::ChainedDraft => chained::run(ctx).await,
        Grammar::PositionDefense => defense::run(ctx).await,
    }
}

//! Round controller. Drives one run from configuration to final response.
//!
//! The controller owns the run-phase ledger ([`RunState`]) and is the only
//! place that decides whether to start another round, stop early, or
//! synthesize. Grammars produce rounds; the delta detector judges them; the
//! controller sequences both and attributes failures.
//!
//! ```text
//! short-circuit? ──yes──→ synthesize(query) ────────────────────→ Done
//!       │no
//!       ▼
//! for k in 1..=budget:
//!     grammar round ─→ detect(prior, current) ─→ snapshot
//!     k ≥ 2 && early exit allowed && !changed ─→ Converged ─┐
//! budget consumed ─────────────────────────────→ Exhausted ─┤
//!                                                            ▼
//!                                  synthesize(transcript) ─→ Done
//! ```

use chrono::Utc;
use council::{CouncilConfig, Grammar, RoundSnapshot, RunPhase, RunResult, RunState};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::delta::DeltaDetector;
use crate::engine::Deliberation;
use crate::errors::{AbortCause, CallSite, RoundFailure, RunError};
use crate::grammar::{execute_round, RoundContext, RoundOutput, SeatCaller};
use crate::settings::EngineSettings;
use crate::synthesis::{short_circuit_messages, synthesis_messages};
use crate::transport::Message;

/// Per-run driver. Borrowed pieces belong to the engine; the caller is
/// built fresh for every run.
pub(crate) struct RoundController<'a> {
    pub settings: &'a EngineSettings,
    pub detector: &'a dyn DeltaDetector,
    pub caller: SeatCaller,
}

impl RoundController<'_> {
    /// Run to completion. `config` must already be validated.
    pub async fn run(
        &self,
        config: &CouncilConfig,
        input: &Deliberation,
    ) -> Result<RunResult, RunError> {
        let mut state = RunState::new();
        let outcome = self.drive(&mut state, config, input).await;
        if let Err(err) = &outcome {
            state.fail(&err.to_string());
            error!(
                kind = %err.kind(),
                rounds = state.rounds_entered(),
                error = %err,
                "run failed"
            );
        }
        outcome
    }

    async fn drive(
        &self,
        state: &mut RunState,
        config: &CouncilConfig,
        input: &Deliberation,
    ) -> Result<RunResult, RunError> {
        if config.short_circuits() {
            return self.short_circuit(state, config, input).await;
        }

        let round_timeout = self.settings.round_timeout(config);
        let mut trace: Option<Vec<RoundSnapshot>> = self.settings.trace_rounds.then(Vec::new);
        let mut prior: Option<RoundSnapshot> = None;
        let mut loops_executed = 0;
        let mut early_exit = false;

        for round in 1..=config.round_budget {
            if self.caller.cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            state.transition(RunPhase::Running(round), "round started")?;
            info!(round, budget = config.round_budget, "round started");

            let started = Instant::now();
            let (output, changed) = {
                let ctx =
                    RoundContext::new(config, &input.query, round, prior.as_ref(), &self.caller)
                        .ok_or_else(|| {
                            RunError::Internal("council has no adversarial seat".into())
                        })?;
                let round_future = self.execute(config.grammar, &ctx);
                match tokio::time::timeout(round_timeout, round_future).await {
                    Ok(result) => result.map_err(|failure| failure.into_run_error(round))?,
                    Err(_) => {
                        return Err(RunError::RoundAborted {
                            round,
                            cause: AbortCause::Timeout {
                                after: round_timeout,
                            },
                        })
                    }
                }
            };

            let snapshot = RoundSnapshot {
                round,
                responses: output.responses,
                models_used: output.models_used,
                critique: output.critique,
                critique_model: output.critique_model,
                material_change: changed,
                duration_ms: started.elapsed().as_millis() as u64,
                completed_at: Utc::now(),
            };
            info!(
                round,
                changed,
                duration_ms = snapshot.duration_ms,
                "round complete"
            );
            if let Some(trace) = trace.as_mut() {
                trace.push(snapshot.clone());
            }
            prior = Some(snapshot);
            loops_executed = round;

            // Round 1 can never converge: there is nothing to compare it to.
            if round >= 2 && config.allow_early_exit && !changed {
                state.transition(RunPhase::Converged, "no material change")?;
                early_exit = true;
                break;
            }
        }

        if !early_exit {
            state.transition(RunPhase::Exhausted, "round budget consumed")?;
        }
        info!(loops_executed, early_exit, "deliberation finished");

        state.transition(RunPhase::Synthesizing, "deliberation finished")?;
        let rounds: &[RoundSnapshot] = match &trace {
            Some(trace) => trace,
            None => prior.as_slice(),
        };
        let original_query = input.original_query.as_deref().unwrap_or(&input.query);
        let messages = synthesis_messages(
            original_query,
            &input.query,
            rounds,
            &config.synthesis_instruction,
        );
        let final_response = self.synthesize(loops_executed, messages).await?;
        state.transition(RunPhase::Done, "synthesis complete")?;

        Ok(RunResult {
            final_response,
            loops_executed,
            early_exit,
            reasoning_trace: trace,
        })
    }

    async fn short_circuit(
        &self,
        state: &mut RunState,
        config: &CouncilConfig,
        input: &Deliberation,
    ) -> Result<RunResult, RunError> {
        info!(complexity = %config.complexity, "short-circuit: bypassing council");
        state.transition(RunPhase::Synthesizing, "short-circuit")?;
        let messages = short_circuit_messages(&input.query, &config.synthesis_instruction);
        let final_response = self.synthesize(0, messages).await?;
        state.transition(RunPhase::Done, "short-circuit answered")?;

        Ok(RunResult {
            final_response,
            loops_executed: 0,
            early_exit: true,
            reasoning_trace: self.settings.trace_rounds.then(Vec::new),
        })
    }

    /// One grammar round followed by the delta check. The detector sees the
    /// round only after every seat call has joined.
    async fn execute(
        &self,
        grammar: Grammar,
        ctx: &RoundContext<'_>,
    ) -> Result<(RoundOutput, bool), RoundFailure> {
        let output = execute_round(grammar, ctx).await?;
        let prior = ctx.prior.map(|snapshot| &snapshot.responses);

        let changed = tokio::select! {
            biased;
            _ = self.caller.cancel.cancelled() => return Err(RoundFailure::Cancelled),
            verdict = self.detector.detect(prior, &output.responses) => {
                verdict.map_err(|source| {
                    warn!(detector = self.detector.name(), error = %source, "delta check failed");
                    RoundFailure::Call {
                        site: CallSite::Judge,
                        source,
                    }
                })?
            }
        };
        Ok((output, changed))
    }

    async fn synthesize(&self, round: u32, messages: Vec<Message>) -> Result<String, RunError> {
        let model = self.settings.synthesis_model().to_string();
        info!(model = %model, "synthesizing");
        let answer = self
            .caller
            .call(CallSite::Synthesis, round, model, messages)
            .await
            .map_err(RoundFailure::into_synthesis_error)?;
        info!(model_used = %answer.model_used, "synthesis answered");
        Ok(answer.text)
    }
}

//! Position then defense: concurrent positions, one targeted critique,
//! then concurrent defenses from the targeted seats only.
//!
//! Untargeted seats keep their position text in the round's snapshot. A
//! critique that names nobody targets everybody.

use council::critique::targeting_instruction;
use council::targeting::targets_or_all;
use council::transcript::format_positions;
use tracing::info;

use super::{run_concurrent, RoundContext, RoundOutput, SeatJob};
use crate::errors::RoundFailure;
use crate::transport::Message;

pub(super) async fn run(ctx: &RoundContext<'_>) -> Result<RoundOutput, RoundFailure> {
    // Phase 1: positions
    let jobs: Vec<SeatJob> = ctx
        .seats
        .iter()
        .enumerate()
        .map(|(idx, seat)| ctx.job(idx, seat, vec![Message::user(position_request(ctx))]))
        .collect();
    let mut output = RoundOutput::default();
    for (role, answer) in run_concurrent(ctx.caller, ctx.round, jobs).await? {
        output.record_seat(role, answer);
    }

    // Phase 2: targeted attack
    let roles = ctx.roles();
    let attack = ctx
        .critique(format!(
            "QUERY: {}\n\nCOUNCIL POSITIONS:\n{}\n\n{}",
            ctx.query,
            format_positions(&output.responses),
            targeting_instruction(&roles)
        ))
        .await?;
    let targeted = targets_or_all(&attack.text, &roles);
    info!(
        round = ctx.round,
        targeted = ?targeted.iter().map(|r| r.id()).collect::<Vec<_>>(),
        "critique targets"
    );

    // Phase 3: defenses from targeted seats
    let jobs: Vec<SeatJob> = ctx
        .seats
        .iter()
        .enumerate()
        .filter(|(_, seat)| targeted.contains(&seat.role))
        .map(|(idx, seat)| {
            let prior_position = output.responses.get(seat.role).unwrap_or_default();
            let request = format!(
                "YOUR PRIOR POSITION:\n{}\n\nRED TEAM ATTACK:\n{}\n\n\
                 Defend your position against this attack. You may revise it if the \
                 critique is valid, or reinforce it if you can refute the objections.",
                prior_position, attack.text
            );
            ctx.job(idx, seat, vec![Message::user(request)])
        })
        .collect();
    for (role, answer) in run_concurrent(ctx.caller, ctx.round, jobs).await? {
        output.record_seat(role, answer);
    }
    output.record_critique(attack);

    Ok(output)
}

fn position_request(ctx: &RoundContext<'_>) -> String {
    match ctx.prior {
        None => format!(
            "QUERY: {}\n\nState your position on this matter clearly and defend it.",
            ctx.query
        ),
        Some(prior) => format!(
            "QUERY: {}\n\nPRIOR ROUND POSITIONS:\n{}\n\nPRIOR RED TEAM ATTACK:\n{}\n\n\
             State your position, revised as needed, clearly and defend it.",
            ctx.query,
            format_positions(&prior.responses),
            prior.critique
        ),
    }
}

//! Fan-out: every seat answers independently, then one critique of the set.

use council::transcript::format_positions;

use super::{run_concurrent, RoundContext, RoundOutput, SeatJob};
use crate::errors::RoundFailure;
use crate::transport::Message;

pub(super) async fn run(ctx: &RoundContext<'_>) -> Result<RoundOutput, RoundFailure> {
    let jobs: Vec<SeatJob> = ctx
        .seats
        .iter()
        .enumerate()
        .map(|(idx, seat)| ctx.job(idx, seat, seat_turns(ctx)))
        .collect();

    let mut output = RoundOutput::default();
    for (role, answer) in run_concurrent(ctx.caller, ctx.round, jobs).await? {
        output.record_seat(role, answer);
    }

    let critique = ctx
        .critique(format!(
            "QUERY: {}\n\nCOUNCIL POSITIONS:\n{}\n\nProvide your critique of these positions.",
            ctx.query,
            format_positions(&output.responses)
        ))
        .await?;
    output.record_critique(critique);

    Ok(output)
}

/// Round 1 sees only the query; later rounds also see the previous
/// positions and critique with a revision instruction.
fn seat_turns(ctx: &RoundContext<'_>) -> Vec<Message> {
    match ctx.prior {
        None => vec![Message::user(ctx.query)],
        Some(prior) => vec![
            Message::user(ctx.query),
            Message::assistant(format_positions(&prior.responses)),
            Message::user(format!(
                "RED TEAM CRITIQUE:\n{}\n\n\
                 Consider the critique above and revise your position as needed. \
                 Address valid objections while keeping what you can defend.",
                prior.critique
            )),
        ],
    }
}

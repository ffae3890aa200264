//! Chained draft: seats revise one shared draft in configuration order,
//! with a critique after every step. 2 × n calls, never overlapping.

use super::{RoundContext, RoundOutput};
use crate::errors::{CallSite, RoundFailure};
use crate::transport::Message;

pub(super) async fn run(ctx: &RoundContext<'_>) -> Result<RoundOutput, RoundFailure> {
    let mut output = RoundOutput::default();
    let mut draft = String::new();
    let mut critiques: Vec<String> = Vec::with_capacity(ctx.seats.len());
    let last = ctx.seats.len().saturating_sub(1);

    for (idx, seat) in ctx.seats.iter().enumerate() {
        let request = if idx == 0 {
            first_draft_request(ctx)
        } else {
            format!(
                "QUERY: {}\n\nACCUMULATED DRAFT:\n{}\n\nCRITIQUES SO FAR:\n{}\n\n\
                 Revise and improve the draft, addressing the critiques.",
                ctx.query,
                draft,
                numbered(&critiques)
            )
        };

        let job = ctx.job(idx, seat, vec![Message::user(request)]);
        let answer = ctx
            .caller
            .call(CallSite::Seat(seat.role), ctx.round, job.model, job.messages)
            .await?;
        draft = answer.text.clone();
        output.record_seat(seat.role, answer);

        let critique_request = if idx == last {
            format!(
                "QUERY: {}\n\nFINAL OUTPUT:\n{}\n\n\
                 Provide your final critique of the complete output.",
                ctx.query, draft
            )
        } else {
            format!(
                "QUERY: {}\n\nCURRENT DRAFT from [{}]:\n{}\n\nCritique this draft.",
                ctx.query,
                seat.role.label(),
                draft
            )
        };
        let critique = ctx.critique(critique_request).await?;
        critiques.push(critique.text.clone());
        // The final critique is the round's critique; earlier ones only fed revisions.
        if idx == last {
            output.record_critique(critique);
        }
    }

    Ok(output)
}

/// The first seat drafts from the query, plus the previous round's final
/// draft and critique when there was one.
fn first_draft_request(ctx: &RoundContext<'_>) -> String {
    match ctx.prior {
        None => format!(
            "QUERY: {}\n\nProvide your initial draft or position.",
            ctx.query
        ),
        Some(prior) => {
            let prior_draft = prior
                .responses
                .iter()
                .last()
                .map(|(_, text)| text)
                .unwrap_or_default();
            format!(
                "QUERY: {}\n\nPREVIOUS ROUND FINAL DRAFT:\n{}\n\n\
                 PREVIOUS ROUND FINAL CRITIQUE:\n{}\n\n\
                 Start a new draft that keeps what survived the critique.",
                ctx.query, prior_draft, prior.critique
            )
        }
    }
}

fn numbered(critiques: &[String]) -> String {
    critiques
        .iter()
        .enumerate()
        .map(|(i, c)| format!("CRITIQUE {}:\n{}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n\n")
}

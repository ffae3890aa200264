//! Final synthesis: one opaque call over the deliberation transcript.

use council::transcript::deliberation_summary;
use council::RoundSnapshot;

use crate::transport::Message;

/// Messages for the full synthesis call.
pub fn synthesis_messages(
    original_query: &str,
    reconstructed_query: &str,
    rounds: &[RoundSnapshot],
    instruction: &str,
) -> Vec<Message> {
    let prompt = format!(
        "You are synthesizing the output of a deliberative council.\n\n\
         ORIGINAL USER QUERY:\n{original_query}\n\n\
         RECONSTRUCTED QUERY (used by council):\n{reconstructed_query}\n\n\
         COUNCIL DELIBERATION:\n{deliberation}\n\n\
         SYNTHESIS INSTRUCTION:\n{instruction}\n\n\
         Produce the final response. Do not mention the council, the deliberation \
         process, or that multiple perspectives were consulted. Speak directly to \
         the user as a unified voice.",
        deliberation = deliberation_summary(rounds),
    );
    vec![Message::user(prompt)]
}

/// Messages for the short-circuit path: no council, just the instruction.
pub fn short_circuit_messages(query: &str, instruction: &str) -> Vec<Message> {
    vec![Message::system(instruction), Message::user(query)]
}

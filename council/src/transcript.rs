//! Plain-text renderings of seat positions and completed rounds.
//!
//! These strings are what other seats, the judge and the synthesis call see.
//! Ordering always follows [`SeatResponses`] order, i.e. configuration order.

use crate::snapshot::{RoundSnapshot, SeatResponses};

/// Positions as `[LABEL]:` blocks, as shown to the adversarial seat and to
/// seats revising in a later round.
pub fn format_positions(responses: &SeatResponses) -> String {
    responses
        .iter()
        .map(|(role, text)| format!("[{}]:\n{}\n", role.label(), text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Positions as bare `[LABEL]` blocks for the convergence judge.
pub fn format_for_judge(responses: &SeatResponses) -> String {
    let mut out = String::new();
    for (role, text) in responses.iter() {
        out.push_str(&format!("[{}]\n{}\n\n", role.label(), text));
    }
    out
}

/// One round: every deliberating position followed by the critique.
pub fn format_round(snapshot: &RoundSnapshot) -> String {
    let mut lines = vec![format!("=== ROUND {} ===", snapshot.round)];
    for (role, text) in snapshot.responses.iter() {
        lines.push(format!("\n[{}]:", role.label()));
        lines.push(text.to_string());
    }
    lines.push("\n[RED TEAM CRITIQUE]:".to_string());
    lines.push(snapshot.critique.clone());
    lines.join("\n")
}

/// Compact transcript of the given rounds for synthesis.
pub fn deliberation_summary(rounds: &[RoundSnapshot]) -> String {
    if rounds.is_empty() {
        return "(No deliberation occurred)".to_string();
    }
    rounds
        .iter()
        .map(format_round)
        .collect::<Vec<_>>()
        .join("\n\n")
}

//! Attack-vector framings for the adversarial seat.
//!
//! The adversarial seat keeps its own configured system prompt; the framing
//! for the configured [`CritiqueStyle`] is appended to it.

use crate::config::SeatSpec;
use crate::roles::{CritiqueStyle, Role};

const LOGICAL: &str = "Your attack vector is reasoning validity. Target fallacies, \
unsupported inferential leaps, unstated premises and conclusions that do not follow \
from the evidence. Ask what would have to be true for the conclusion to be false, \
then attack those load-bearing assumptions.";

const FEASIBILITY: &str = "Your attack vector is implementation reality. Target \
underestimated costs, optimistic execution assumptions, missing prerequisites, ignored \
resource limits and happy-path thinking. Ask what happens when this meets friction in \
the real world, then show where it breaks.";

const ETHICAL: &str = "Your attack vector is values and consequences. Target harms to \
unrepresented stakeholders, negative externalities, who carries the burden, and the \
precedents being set. Ask who is harmed and whether that harm is justified, then \
stress-test the justification.";

const STEELMAN: &str = "Your attack vector is the opposition's strongest case. Do not \
attack the council's position directly. Build the best good-faith argument against the \
emerging consensus and surface the evidence that favors the opposing view. If the \
council cannot answer it, their position is not yet defensible.";

/// Framing text for a critique style.
pub fn framing(style: CritiqueStyle) -> &'static str {
    match style {
        CritiqueStyle::Logical => LOGICAL,
        CritiqueStyle::Feasibility => FEASIBILITY,
        CritiqueStyle::Ethical => ETHICAL,
        CritiqueStyle::Steelman => STEELMAN,
    }
}

/// Full system message for the adversarial seat.
pub fn adversary_system_prompt(seat: &SeatSpec, style: CritiqueStyle) -> String {
    format!("{}\n\n{}", seat.system_prompt.trim_end(), framing(style))
}

/// Instruction appended to a position-then-defense critique request so the
/// weakest seats can be extracted deterministically.
pub fn targeting_instruction(roles: &[Role]) -> String {
    let labels: Vec<&str> = roles.iter().map(|r| r.label()).collect();
    format!(
        "Identify the weakest position(s) and attack them. Be specific about which \
         position you are attacking and why. End with a single line of the form \
         `TARGETS: <ROLE>, <ROLE>` naming the attacked positions, chosen from: {}.",
        labels.join(", ")
    )
}

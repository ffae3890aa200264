//! Extraction of the seats an adversarial critique attacks.
//!
//! Parsing is deterministic:
//!
//! 1. If the critique contains a `TARGETS:` line, only the last such line is
//!    scanned. Otherwise the whole critique is scanned.
//! 2. A role matches on its label (`DOMAIN_EXPERT`), its id (`domain_expert`)
//!    or its spaced name (`domain expert`), case-insensitively and on word
//!    boundaries.
//! 3. Matches come back in the order of the candidate slice, not the order
//!    they appear in the text.
//!
//! An empty result means nothing could be extracted; callers treat that as
//! "every seat is targeted".

use std::sync::LazyLock;

use regex::Regex;

use crate::roles::Role;

static TARGETS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s*_>#-]*targets?[\s*_]*:(.*)$")
        .expect("TARGETS_LINE regex should compile")
});

static ROLE_PATTERNS: LazyLock<Vec<(Role, Regex)>> = LazyLock::new(|| {
    Role::all()
        .iter()
        .map(|role| {
            let pattern = format!(r"(?i)\b{}\b", role.id().replace('_', r"[_\s-]"));
            let regex = Regex::new(&pattern).expect("role pattern should compile");
            (*role, regex)
        })
        .collect()
});

/// Roles from `candidates` named by `critique`, in candidate order.
pub fn extract_targets(critique: &str, candidates: &[Role]) -> Vec<Role> {
    let haystack = TARGETS_LINE
        .captures_iter(critique)
        .last()
        .and_then(|caps| caps.get(1))
        .map_or(critique, |m| m.as_str());

    candidates
        .iter()
        .copied()
        .filter(|role| {
            ROLE_PATTERNS
                .iter()
                .find(|(r, _)| r == role)
                .is_some_and(|(_, re)| re.is_match(haystack))
        })
        .collect()
}

/// Like [`extract_targets`], but falls back to every candidate when the
/// critique names none of them.
pub fn targets_or_all(critique: &str, candidates: &[Role]) -> Vec<Role> {
    let targets = extract_targets(critique, candidates);
    if targets.is_empty() {
        tracing::debug!("critique named no seats, targeting all");
        candidates.to_vec()
    } else {
        targets
    }
}

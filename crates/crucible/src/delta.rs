//! Convergence checks between consecutive rounds.
//!
//! A [`DeltaDetector`] answers one question: did the deliberating positions
//! change materially since the previous round? With no previous round the
//! answer is always yes. Detectors never mutate their inputs.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use council::transcript::format_for_judge;
use council::SeatResponses;

use crate::errors::TransportError;
use crate::transport::{CallRequest, Message, Transport};

/// System prompt for the judge call.
pub const JUDGE_SYSTEM_PROMPT: &str = "You are a judge. Answer only YES or NO.";

/// Jaccard similarity at or above which a seat counts as unchanged.
pub const DEFAULT_LEXICAL_THRESHOLD: f64 = 0.85;

#[async_trait]
pub trait DeltaDetector: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &'static str;

    async fn detect(
        &self,
        prior: Option<&SeatResponses>,
        current: &SeatResponses,
    ) -> Result<bool, TransportError>;
}

// ── Judge ────────────────────────────────────────────────────────────────────

/// Asks a judge model whether the positions changed.
///
/// Anything short of an unambiguous YES counts as "no material change".
pub struct JudgeDetector {
    transport: Arc<dyn Transport>,
    model: String,
    fallback: Vec<String>,
}

impl JudgeDetector {
    pub fn new(transport: Arc<dyn Transport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            fallback: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: Vec<String>) -> Self {
        self.fallback = fallback;
        self
    }
}

#[async_trait]
impl DeltaDetector for JudgeDetector {
    fn name(&self) -> &'static str {
        "judge"
    }

    async fn detect(
        &self,
        prior: Option<&SeatResponses>,
        current: &SeatResponses,
    ) -> Result<bool, TransportError> {
        let Some(prior) = prior else {
            return Ok(true);
        };

        let prompt = format!(
            "Did positions materially change?\n\n\
             PRIOR:\n{}\n\n\
             CURRENT:\n{}\n\n\
             Answer YES if substantive changes occurred. \
             Answer NO if changes are only cosmetic.",
            format_for_judge(prior),
            format_for_judge(current),
        );
        let request = CallRequest::new(
            self.model.clone(),
            vec![Message::system(JUDGE_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_fallback(self.fallback.clone());

        let response = self.transport.send(request).await?;
        let changed = is_affirmative(&response.text);
        tracing::debug!(verdict = %response.text.trim(), changed, "judge verdict");
        Ok(changed)
    }
}

/// `true` only when the first word is YES and no NO appears anywhere.
pub fn is_affirmative(text: &str) -> bool {
    let mut words = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase());
    match words.next() {
        Some(first) if first == "YES" => words.all(|w| w != "NO"),
        _ => false,
    }
}

// ── Lexical ──────────────────────────────────────────────────────────────────

/// Word-set Jaccard comparison per seat; no transport calls.
#[derive(Debug, Clone)]
pub struct LexicalDetector {
    threshold: f64,
}

impl Default for LexicalDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LEXICAL_THRESHOLD)
    }
}

impl LexicalDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl DeltaDetector for LexicalDetector {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn detect(
        &self,
        prior: Option<&SeatResponses>,
        current: &SeatResponses,
    ) -> Result<bool, TransportError> {
        let Some(prior) = prior else {
            return Ok(true);
        };
        let changed = current.iter().any(|(role, text)| match prior.get(role) {
            Some(before) => jaccard(before, text) < self.threshold,
            None => true,
        });
        Ok(changed)
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the two texts' word sets. Two empty texts are identical.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use council::Role;

    fn responses(pairs: &[(Role, &str)]) -> SeatResponses {
        pairs.iter().map(|(r, t)| (*r, t.to_string())).collect()
    }

    #[test]
    fn test_affirmative_parsing() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("yes."));
        assert!(is_affirmative("  Yes, the positions shifted."));
        assert!(!is_affirmative("NO"));
        assert!(!is_affirmative("Yes and no."));
        assert!(!is_affirmative("I think YES"));
        assert!(!is_affirmative("YESTERDAY"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard("", ""), 1.0);
        assert_eq!(jaccard("a b c", "C B A"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert!((jaccard("a b c d", "a b c e") - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_lexical_first_round_always_changed() {
        let current = responses(&[(Role::Creative, "same")]);
        assert!(LexicalDetector::default().detect(None, &current).await.unwrap());
    }

    #[tokio::test]
    async fn test_lexical_detects_rewrite() {
        let prior = responses(&[
            (Role::Creative, "use a queue with backpressure"),
            (Role::Pragmatist, "ship the simple version first"),
        ]);
        let same = prior.clone();
        let rewritten = responses(&[
            (Role::Creative, "use a queue with backpressure"),
            (Role::Pragmatist, "rewrite everything in a new language"),
        ]);
        let detector = LexicalDetector::default();
        assert!(!detector.detect(Some(&prior), &same).await.unwrap());
        assert!(detector.detect(Some(&prior), &rewritten).await.unwrap());
    }

    #[tokio::test]
    async fn test_lexical_new_seat_counts_as_change() {
        let prior = responses(&[(Role::Creative, "x")]);
        let current = responses(&[(Role::Creative, "x"), (Role::Pragmatist, "y")]);
        assert!(LexicalDetector::default()
            .detect(Some(&prior), &current)
            .await
            .unwrap());
    }
}

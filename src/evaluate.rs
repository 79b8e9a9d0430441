//! Retrieval sufficiency evaluation.
//!
//! Decides whether the local matches for a question are strong enough to
//! answer from, and how confident that answer can be.
//!
//! # Tier Rules
//!
//! With `top` = score of the first match and `avg` = mean of all scores,
//! the first matching rule wins:
//!
//! | Guard | Tier | Confidence |
//! |-------|------|------------|
//! | `top >= 0.82 && avg >= 0.70` | high | `min(1.0, (top+avg)/2)` |
//! | `top >= 0.60` | medium | `min(0.85, (top+avg)/2)` |
//! | otherwise | low | `max(0.1, (top+avg)/2)` |
//!
//! An empty retrieval is always `low` with confidence `0.0`. Every
//! confidence is clamped into `[0, 1]`.

use crate::models::{EvaluationResult, RetrievalResult, Sufficiency};

pub const HIGH_TOP_THRESHOLD: f64 = 0.82;
pub const HIGH_AVG_THRESHOLD: f64 = 0.70;
pub const MEDIUM_TOP_THRESHOLD: f64 = 0.60;

pub const HIGH_CONFIDENCE_CAP: f64 = 1.0;
pub const MEDIUM_CONFIDENCE_CAP: f64 = 0.85;
pub const LOW_CONFIDENCE_FLOOR: f64 = 0.1;

pub const NO_MATCHES_RATIONALE: &str = "No relevant internal matches were found.";

/// Aggregate scores a tier guard looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    pub top: f64,
    pub avg: f64,
}

impl ScoreSummary {
    fn midpoint(&self) -> f64 {
        (self.top + self.avg) / 2.0
    }
}

struct TierRule {
    guard: fn(&ScoreSummary) -> bool,
    sufficiency: Sufficiency,
    confidence: fn(f64) -> f64,
    rationale: &'static str,
}

/// Evaluated top-down; the last rule always matches.
static TIER_RULES: [TierRule; 3] = [
    TierRule {
        guard: |s| s.top >= HIGH_TOP_THRESHOLD && s.avg >= HIGH_AVG_THRESHOLD,
        sufficiency: Sufficiency::High,
        confidence: |mid| mid.min(HIGH_CONFIDENCE_CAP),
        rationale: "Top and average relevance indicate internal data is sufficient.",
    },
    TierRule {
        guard: |s| s.top >= MEDIUM_TOP_THRESHOLD,
        sufficiency: Sufficiency::Medium,
        confidence: |mid| mid.min(MEDIUM_CONFIDENCE_CAP),
        rationale: "Internal matches are somewhat relevant but may miss details.",
    },
    TierRule {
        guard: |_| true,
        sufficiency: Sufficiency::Low,
        confidence: |mid| mid.max(LOW_CONFIDENCE_FLOOR),
        rationale: "Retrieved results are too weak; web search likely needed.",
    },
];

/// Summarize match scores, or `None` when there are no matches.
///
/// Non-finite scores count as `0.0`.
pub fn summarize_scores(retrieval: &RetrievalResult) -> Option<ScoreSummary> {
    let scores: Vec<f64> = retrieval
        .matches
        .iter()
        .map(|m| if m.score.is_finite() { m.score } else { 0.0 })
        .collect();

    let top = *scores.first()?;
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    Some(ScoreSummary { top, avg })
}

/// Classify a summary into a tier. Pure; exposed for direct testing.
pub fn classify(summary: &ScoreSummary) -> EvaluationResult {
    let rule = TIER_RULES
        .iter()
        .find(|rule| (rule.guard)(summary))
        .unwrap_or(&TIER_RULES[TIER_RULES.len() - 1]);

    EvaluationResult {
        sufficiency: rule.sufficiency,
        confidence: clamp_unit((rule.confidence)(summary.midpoint())),
        rationale: rule.rationale.to_string(),
    }
}

/// Evaluate whether `retrieval` is sufficient to answer from.
pub fn evaluate(retrieval: &RetrievalResult) -> EvaluationResult {
    match summarize_scores(retrieval) {
        Some(summary) => classify(&summary),
        None => EvaluationResult {
            sufficiency: Sufficiency::Low,
            confidence: 0.0,
            rationale: NO_MATCHES_RATIONALE.to_string(),
        },
    }
}

/// Clamp into `[0, 1]`, mapping NaN to `0.0`.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

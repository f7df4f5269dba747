//! Templates substituted when a synthesis call degrades.

use super::{DegradedReason, DecisionOutcome, Explanation};
use crate::workflows::underwriting::domain::{PolicyExcerpt, RiskScores};
use crate::workflows::underwriting::scoring::{ScoringEngine, WeightedDecision};

const REASON_PREVIEW_CHARS: usize = 120;

fn preview(reason: &DegradedReason) -> String {
    reason.to_string().chars().take(REASON_PREVIEW_CHARS).collect()
}

pub(crate) fn decision(
    engine: &ScoringEngine,
    scores: &RiskScores,
    reason: &DegradedReason,
) -> DecisionOutcome {
    DecisionOutcome {
        outcome: engine.weighted_decision(scores),
        underwriter_reasoning: format!(
            "Deterministic fallback applied ({}). Weighted average of sub-scores used.",
            preview(reason)
        ),
    }
}

pub(crate) fn narrative(outcome: &WeightedDecision) -> String {
    format!(
        "Your property has been assessed with an overall risk score of {:.0}/100. The underwriting \
         decision is: {}. A premium multiplier of {:.2}x applies. The key risk factors considered \
         were flood zone classification, property construction age, nearby planning activity, and \
         local crime levels.",
        outcome.overall_score,
        outcome.decision.label(),
        outcome.premium_multiplier,
    )
}

pub(crate) fn explanation(
    engine: &ScoringEngine,
    scores: &RiskScores,
    outcome: &WeightedDecision,
    policies: &[PolicyExcerpt],
) -> Explanation {
    Explanation {
        risk_factors: engine.explanations(scores),
        policy_citations: policies.iter().map(PolicyExcerpt::citation).collect(),
        narrative: narrative(outcome),
    }
}

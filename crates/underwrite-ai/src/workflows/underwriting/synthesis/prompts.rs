use serde_json::json;

use super::capability::{PromptPurpose, StructuredPrompt};
use crate::workflows::underwriting::domain::{
    AssessmentRequest, PolicyExcerpt, RiskDimension, RiskScores,
};
use crate::workflows::underwriting::scoring::{
    DimensionWeights, WeightedDecision, DECLINE_THRESHOLD, MAX_PREMIUM_MULTIPLIER,
    MIN_PREMIUM_MULTIPLIER, REFER_THRESHOLD,
};

const UNDERWRITER_SYSTEM: &str =
    "You are an expert UK home insurance underwriter. Respond only with valid JSON.";

pub(crate) fn construction_risk(headings: &[String]) -> StructuredPrompt {
    StructuredPrompt {
        purpose: PromptPurpose::ConstructionRisk,
        system: UNDERWRITER_SYSTEM.to_string(),
        instructions: "Rate the construction and development risk these nearby planning \
                       applications pose to an existing home (subsidence, ground works, access \
                       disruption, large developments). Return a severity between 0 and 30 and one \
                       sentence of reasoning."
            .to_string(),
        context: json!({ "application_headings": headings }),
    }
}

fn scores_context(scores: &RiskScores, weights: &DimensionWeights) -> serde_json::Value {
    let dimensions: Vec<_> = RiskDimension::EXPLANATION_ORDER
        .iter()
        .map(|dimension| {
            let score = scores.get(*dimension);
            json!({
                "name": dimension.factor_name(),
                "score": score.value,
                "label": score.label,
                "weight": weights.weight(*dimension),
                "reasoning": score.reasoning,
            })
        })
        .collect();
    json!(dimensions)
}

fn policy_context(policies: &[PolicyExcerpt]) -> serde_json::Value {
    let excerpts: Vec<_> = policies
        .iter()
        .map(|policy| {
            json!({
                "citation": policy.citation(),
                "text": policy.text,
            })
        })
        .collect();
    json!(excerpts)
}

pub(crate) fn decision_synthesis(
    scores: &RiskScores,
    weights: &DimensionWeights,
    policies: &[PolicyExcerpt],
) -> StructuredPrompt {
    StructuredPrompt {
        purpose: PromptPurpose::DecisionSynthesis,
        system: UNDERWRITER_SYSTEM.to_string(),
        instructions: format!(
            "Synthesise the sub-scores and policy guidelines into an overall risk score (0-100), a \
             premium multiplier ({MIN_PREMIUM_MULTIPLIER:.2}-{MAX_PREMIUM_MULTIPLIER:.2}) and a \
             decision: accept below {REFER_THRESHOLD:.0}, refer from {REFER_THRESHOLD:.0} to below \
             {DECLINE_THRESHOLD:.0}, decline at {DECLINE_THRESHOLD:.0} or above. Give 2-3 sentences \
             of underwriter reasoning."
        ),
        context: json!({
            "dimensions": scores_context(scores, weights),
            "policies": policy_context(policies),
        }),
    }
}

pub(crate) fn explanation(
    request: &AssessmentRequest,
    scores: &RiskScores,
    weights: &DimensionWeights,
    outcome: &WeightedDecision,
    underwriter_reasoning: &str,
    policies: &[PolicyExcerpt],
) -> StructuredPrompt {
    StructuredPrompt {
        purpose: PromptPurpose::Explanation,
        system: "You explain insurance underwriting decisions to customers. Respond only with \
                 valid JSON."
            .to_string(),
        instructions: "Return one risk factor per dimension (name, score, weight, one sentence of \
                       reasoning), the policy sections that informed the decision as \
                       'Title – Section', and a 3-5 sentence plain English narrative."
            .to_string(),
        context: json!({
            "address": request.address,
            "postcode": request.postcode,
            "decision": outcome.decision.label(),
            "overall_risk_score": outcome.overall_score,
            "premium_multiplier": outcome.premium_multiplier,
            "underwriter_reasoning": underwriter_reasoning,
            "dimensions": scores_context(scores, weights),
            "policies": policy_context(policies),
        }),
    }
}

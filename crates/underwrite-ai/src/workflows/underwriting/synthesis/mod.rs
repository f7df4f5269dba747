//! Typed adapter over the generative capability.
//!
//! Every call returns [`Synthesis`]: either a validated reply or the reason it degraded. The
//! adapter never substitutes fallbacks itself; callers branch on `Degraded` and use the templates
//! in [`fallback`].

pub mod capability;
pub(crate) mod fallback;
mod prompts;

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

pub use capability::{
    CapabilityError, GenerativeCapability, OfflineCapability, PromptPurpose, StructuredPrompt,
};

use super::domain::{
    AssessmentRequest, PolicyExcerpt, RiskDimension, RiskFactorExplanation, RiskScores,
};
use super::scoring::rules::CONSTRUCTION_COMPONENT_MAX;
use super::scoring::{
    Decision, DimensionWeights, WeightedDecision, MAX_PREMIUM_MULTIPLIER, MIN_PREMIUM_MULTIPLIER,
};

/// Outcome of one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesis<T> {
    Ok(T),
    Degraded(DegradedReason),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DegradedReason {
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("reply failed validation: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct ConstructionRiskReply {
    #[schemars(description = "Construction risk severity between 0 and 30")]
    severity: f64,
    #[serde(default)]
    #[schemars(description = "One sentence explaining the severity")]
    reasoning: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct DecisionReply {
    #[schemars(description = "Overall risk score between 0 and 100")]
    overall_risk_score: f64,
    #[schemars(description = "Premium multiplier between 0.80 and 3.00")]
    premium_multiplier: f64,
    decision: Decision,
    #[schemars(description = "2-3 sentence synthesis of all sub-score findings")]
    underwriter_reasoning: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct FactorReply {
    name: String,
    score: f64,
    weight: f64,
    reasoning: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct ExplanationReply {
    #[schemars(description = "Exactly one entry per risk dimension")]
    risk_factors: Vec<FactorReply>,
    #[serde(default)]
    #[schemars(description = "Policy sections that informed the decision, as 'Title – Section'")]
    policy_citations: Vec<String>,
    #[schemars(description = "3-5 sentences explaining the decision in plain English")]
    plain_english_narrative: String,
}

/// Validated construction-risk component for the planning dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionAssessment {
    pub severity: f64,
    pub reasoning: String,
}

/// Overall score, multiplier and decision with the underwriter's reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub outcome: WeightedDecision,
    pub underwriter_reasoning: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub risk_factors: Vec<RiskFactorExplanation>,
    pub policy_citations: Vec<String>,
    pub narrative: String,
}

#[derive(Clone)]
pub struct SynthesisAdapter {
    capability: Arc<dyn GenerativeCapability>,
    timeout: Duration,
}

impl SynthesisAdapter {
    pub fn new(capability: Arc<dyn GenerativeCapability>, timeout: Duration) -> Self {
        Self {
            capability,
            timeout,
        }
    }

    pub async fn construction_risk(&self, headings: &[String]) -> Synthesis<ConstructionAssessment> {
        let reply: ConstructionRiskReply = match self.call(prompts::construction_risk(headings)).await
        {
            Synthesis::Ok(reply) => reply,
            Synthesis::Degraded(reason) => return Synthesis::Degraded(reason),
        };

        if !(0.0..=CONSTRUCTION_COMPONENT_MAX).contains(&reply.severity) {
            return Synthesis::Degraded(DegradedReason::Invalid(format!(
                "construction severity {} outside 0-{CONSTRUCTION_COMPONENT_MAX}",
                reply.severity
            )));
        }

        Synthesis::Ok(ConstructionAssessment {
            severity: reply.severity,
            reasoning: reply.reasoning,
        })
    }

    pub async fn decide(
        &self,
        scores: &RiskScores,
        weights: &DimensionWeights,
        policies: &[PolicyExcerpt],
    ) -> Synthesis<DecisionOutcome> {
        let prompt = prompts::decision_synthesis(scores, weights, policies);
        match self.call::<DecisionReply>(prompt).await {
            Synthesis::Ok(reply) => validate_decision(reply),
            Synthesis::Degraded(reason) => Synthesis::Degraded(reason),
        }
    }

    pub async fn explain(
        &self,
        request: &AssessmentRequest,
        scores: &RiskScores,
        weights: &DimensionWeights,
        outcome: &WeightedDecision,
        underwriter_reasoning: &str,
        policies: &[PolicyExcerpt],
    ) -> Synthesis<Explanation> {
        let prompt = prompts::explanation(
            request,
            scores,
            weights,
            outcome,
            underwriter_reasoning,
            policies,
        );
        match self.call::<ExplanationReply>(prompt).await {
            Synthesis::Ok(reply) => validate_explanation(reply),
            Synthesis::Degraded(reason) => Synthesis::Degraded(reason),
        }
    }

    async fn call<R>(&self, prompt: StructuredPrompt) -> Synthesis<R>
    where
        R: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(R)).unwrap_or_default();
        let invocation = self.capability.invoke(&prompt, &schema, self.timeout);

        let text = match tokio::time::timeout(self.timeout, invocation).await {
            Err(_) | Ok(Err(CapabilityError::Timeout)) => {
                return Synthesis::Degraded(DegradedReason::Timeout(self.timeout))
            }
            Ok(Err(err)) => return Synthesis::Degraded(DegradedReason::Unavailable(err.to_string())),
            Ok(Ok(text)) => text,
        };

        match serde_json::from_str::<R>(strip_code_fence(&text)) {
            Ok(reply) => {
                debug!(purpose = prompt.purpose.as_str(), "synthesis reply parsed");
                Synthesis::Ok(reply)
            }
            Err(err) => Synthesis::Degraded(DegradedReason::Malformed(err.to_string())),
        }
    }
}

fn validate_decision(reply: DecisionReply) -> Synthesis<DecisionOutcome> {
    if !(0.0..=100.0).contains(&reply.overall_risk_score) {
        return Synthesis::Degraded(DegradedReason::Invalid(format!(
            "overall score {} outside 0-100",
            reply.overall_risk_score
        )));
    }
    if !(MIN_PREMIUM_MULTIPLIER..=MAX_PREMIUM_MULTIPLIER).contains(&reply.premium_multiplier) {
        return Synthesis::Degraded(DegradedReason::Invalid(format!(
            "premium multiplier {} outside {MIN_PREMIUM_MULTIPLIER:.2}-{MAX_PREMIUM_MULTIPLIER:.2}",
            reply.premium_multiplier
        )));
    }

    // Bands apply to the score as replied; rounding is for storage only.
    let expected = Decision::classify(reply.overall_risk_score);
    if reply.decision != expected {
        return Synthesis::Degraded(DegradedReason::Invalid(format!(
            "decision {} inconsistent with overall score {} ({})",
            reply.decision.label(),
            reply.overall_risk_score,
            expected.label()
        )));
    }
    if reply.underwriter_reasoning.trim().is_empty() {
        return Synthesis::Degraded(DegradedReason::Invalid(
            "empty underwriter reasoning".to_string(),
        ));
    }

    Synthesis::Ok(DecisionOutcome {
        outcome: WeightedDecision::from_parts(
            reply.overall_risk_score,
            reply.premium_multiplier,
            reply.decision,
        ),
        underwriter_reasoning: reply.underwriter_reasoning,
    })
}

fn validate_explanation(reply: ExplanationReply) -> Synthesis<Explanation> {
    if reply.plain_english_narrative.trim().is_empty() {
        return Synthesis::Degraded(DegradedReason::Invalid("empty narrative".to_string()));
    }
    if reply.risk_factors.len() != RiskDimension::EXPLANATION_ORDER.len() {
        return Synthesis::Degraded(DegradedReason::Invalid(format!(
            "expected {} risk factors, got {}",
            RiskDimension::EXPLANATION_ORDER.len(),
            reply.risk_factors.len()
        )));
    }

    let mut risk_factors = Vec::with_capacity(reply.risk_factors.len());
    for dimension in RiskDimension::EXPLANATION_ORDER {
        let mut matching = reply
            .risk_factors
            .iter()
            .filter(|factor| factor.name.trim().eq_ignore_ascii_case(dimension.factor_name()));
        let factor = match (matching.next(), matching.next()) {
            (Some(factor), None) => factor,
            _ => {
                return Synthesis::Degraded(DegradedReason::Invalid(format!(
                    "expected exactly one '{}' factor",
                    dimension.factor_name()
                )))
            }
        };
        if !(0.0..=100.0).contains(&factor.score) || !(0.0..=1.0).contains(&factor.weight) {
            return Synthesis::Degraded(DegradedReason::Invalid(format!(
                "factor '{}' has score {} / weight {} out of range",
                factor.name, factor.score, factor.weight
            )));
        }
        risk_factors.push(RiskFactorExplanation {
            name: dimension.factor_name().to_string(),
            score: factor.score,
            weight: factor.weight,
            reasoning: factor.reasoning.clone(),
        });
    }

    Synthesis::Ok(Explanation {
        risk_factors,
        policy_citations: reply.policy_citations,
        narrative: reply.plain_english_narrative,
    })
}

/// Unwraps a reply wrapped in a Markdown code fence, with or without a `json` tag.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let body = &trimmed[start + 3..];
    let body = body
        .strip_prefix("json")
        .or_else(|| body.strip_prefix("JSON"))
        .unwrap_or(body);
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

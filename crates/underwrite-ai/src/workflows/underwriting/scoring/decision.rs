use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::config::DimensionWeights;
use super::rules::{clamp_score, round1, round2};
use crate::workflows::underwriting::domain::{RiskDimension, RiskScores};

pub const REFER_THRESHOLD: f64 = 60.0;
pub const DECLINE_THRESHOLD: f64 = 80.0;
pub const MIN_PREMIUM_MULTIPLIER: f64 = 0.80;
pub const MAX_PREMIUM_MULTIPLIER: f64 = 3.00;

/// Terminal underwriting outcome. Each band is closed on its lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Refer,
    Decline,
}

impl Decision {
    pub fn classify(overall_score: f64) -> Self {
        if overall_score >= DECLINE_THRESHOLD {
            Decision::Decline
        } else if overall_score >= REFER_THRESHOLD {
            Decision::Refer
        } else {
            Decision::Accept
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::Refer => "REFER",
            Decision::Decline => "DECLINE",
        }
    }
}

pub fn premium_multiplier(overall_score: f64) -> f64 {
    (1.0 + overall_score / 100.0 * 2.0).clamp(MIN_PREMIUM_MULTIPLIER, MAX_PREMIUM_MULTIPLIER)
}

pub fn weighted_overall(scores: &RiskScores, weights: &DimensionWeights) -> f64 {
    RiskDimension::EXPLANATION_ORDER
        .iter()
        .map(|dimension| scores.get(*dimension).value * weights.weight(*dimension))
        .sum()
}

/// Overall score, multiplier and decision. Replaced wholesale, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedDecision {
    pub overall_score: f64,
    pub premium_multiplier: f64,
    pub decision: Decision,
}

impl WeightedDecision {
    /// Formula path: multiplier and decision both derive from the rounded overall score.
    pub fn from_overall(overall_score: f64) -> Self {
        let overall_score = round1(clamp_score(overall_score));
        Self {
            overall_score,
            premium_multiplier: round2(premium_multiplier(overall_score)),
            decision: Decision::classify(overall_score),
        }
    }

    /// Synthesised path: values were validated by the caller.
    pub(crate) fn from_parts(overall_score: f64, premium_multiplier: f64, decision: Decision) -> Self {
        Self {
            overall_score: round1(overall_score),
            premium_multiplier: round2(premium_multiplier),
            decision,
        }
    }
}

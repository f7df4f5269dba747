mod config;
mod decision;
pub mod rules;

pub use config::{DimensionWeights, ScoringConfig};
pub(crate) use config::{NEUTRAL_FLOOD, NEUTRAL_LOCALITY, NEUTRAL_PLANNING, NEUTRAL_PROPERTY_AGE};
pub use decision::{
    premium_multiplier, weighted_overall, Decision, WeightedDecision, DECLINE_THRESHOLD,
    MAX_PREMIUM_MULTIPLIER, MIN_PREMIUM_MULTIPLIER, REFER_THRESHOLD,
};

use std::collections::BTreeMap;

use super::domain::{
    FloodZone, RiskDetail, RiskDimension, RiskFactorExplanation, RiskScore, RiskScores,
    WarningSeverity,
};
use super::sources::{
    appeal_count, CrimeEvidence, EnergyCertificate, FloodEvidence, PlanningEvidence,
};
use rules::{round1, PlanningInputs};

/// Stateless engine turning source evidence into dimension scores and the composite decision.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn planning(&self, evidence: &PlanningEvidence, construction_component: f64) -> RiskScore {
        let council = evidence.council.clone().unwrap_or_default();
        let appeals = appeal_count(&evidence.applications);
        let construction_component =
            construction_component.clamp(0.0, rules::CONSTRUCTION_COMPONENT_MAX);
        let inputs = PlanningInputs {
            activity_level: council.activity_level,
            new_homes_approved: council.new_homes_approved,
            refusal_rate: council.refusal_rate,
            construction_component,
            appeals,
        };
        let value = round1(rules::planning_score(&inputs));
        let label = council
            .activity_level
            .map(|level| level.label())
            .unwrap_or_else(|| rules::severity_label(value))
            .to_string();
        let activity = council
            .activity_level
            .map(|level| level.label().to_ascii_lowercase())
            .unwrap_or_else(|| "unknown".to_string());

        let reasoning = format!(
            "Council development activity {activity}; {} new homes approved, refusal rate {:.1}%. \
             {} nearby applications, {appeals} under appeal; construction risk component {:.1}/30.",
            council.new_homes_approved,
            council.refusal_rate,
            evidence.applications.len(),
            construction_component,
        );

        RiskScore {
            dimension: RiskDimension::Planning,
            value,
            label,
            reasoning,
            detail: RiskDetail::Planning {
                activity_level: council.activity_level,
                new_homes_approved: council.new_homes_approved,
                refusal_rate: council.refusal_rate,
                nearby_applications: evidence.applications.len(),
                appeals,
                construction_component,
            },
        }
    }

    pub fn neutral_planning(&self) -> RiskScore {
        RiskScore {
            dimension: RiskDimension::Planning,
            value: NEUTRAL_PLANNING,
            label: "Low".to_string(),
            reasoning: format!(
                "Planning data unavailable; neutral holding score of {NEUTRAL_PLANNING:.1}/100 applied."
            ),
            detail: RiskDetail::Planning {
                activity_level: None,
                new_homes_approved: 0,
                refusal_rate: 0.0,
                nearby_applications: 0,
                appeals: 0,
                construction_component: 0.0,
            },
        }
    }

    pub fn flood(&self, evidence: &FloodEvidence, flood_mentions: u32) -> RiskScore {
        let value = round1(rules::flood_score(
            evidence.zone,
            evidence.most_severe_warning,
            flood_mentions,
        ));
        let zone_text = match evidence.zone {
            FloodZone::Unknown => format!(
                "Flood zone could not be determined; holding base of {:.0} applied.",
                rules::flood_zone_base(FloodZone::Unknown)
            ),
            zone => format!("Rivers & sea flood {} ({} risk).", zone.label(), zone.risk_level()),
        };
        let warning_text = match evidence.most_severe_warning {
            WarningSeverity::None => "No active flood warnings nearby.".to_string(),
            severity => format!(
                "Active {} nearby (+{:.0}).",
                severity.label(),
                rules::warning_uplift(severity)
            ),
        };
        let reasoning = format!(
            "{zone_text} {warning_text} {flood_mentions} nearby planning applications mention \
             flood-relevant works (+{:.0}).",
            rules::planning_mention_uplift(flood_mentions)
        );

        RiskScore {
            dimension: RiskDimension::Flood,
            value,
            label: evidence.zone.risk_level().to_string(),
            reasoning,
            detail: RiskDetail::Flood {
                zone: evidence.zone,
                warning: evidence.most_severe_warning,
                flood_mentions,
            },
        }
    }

    pub fn neutral_flood(&self, flood_mentions: u32) -> RiskScore {
        RiskScore {
            dimension: RiskDimension::Flood,
            value: NEUTRAL_FLOOD,
            label: FloodZone::Unknown.risk_level().to_string(),
            reasoning: format!(
                "Flood zone could not be evaluated; neutral holding score of {NEUTRAL_FLOOD:.1}/100 \
                 applied. Manual verification required."
            ),
            detail: RiskDetail::Flood {
                zone: FloodZone::Unknown,
                warning: WarningSeverity::None,
                flood_mentions,
            },
        }
    }

    pub fn property_age(&self, certificate: &EnergyCertificate) -> RiskScore {
        let value = round1(rules::property_age_score(
            &certificate.construction_age_band,
            certificate.energy_rating,
        ));
        let rating_text = match certificate.energy_rating {
            Some(rating) => format!("energy rating {rating:?}"),
            None => "no energy rating on record".to_string(),
        };
        let reasoning = format!(
            "Property type: {}. Construction age band: {}; {rating_text}. Property age risk score: \
             {value:.1}/100.",
            certificate.property_type, certificate.construction_age_band,
        );

        RiskScore {
            dimension: RiskDimension::PropertyAge,
            value,
            label: rules::severity_label(value).to_string(),
            reasoning,
            detail: RiskDetail::PropertyAge {
                age_band: certificate.construction_age_band.clone(),
                property_type: certificate.property_type.clone(),
                energy_rating: certificate.energy_rating,
            },
        }
    }

    pub fn neutral_property_age(&self) -> RiskScore {
        RiskScore {
            dimension: RiskDimension::PropertyAge,
            value: NEUTRAL_PROPERTY_AGE,
            label: rules::severity_label(NEUTRAL_PROPERTY_AGE).to_string(),
            reasoning: format!(
                "Energy certificate unavailable; construction age unknown, neutral holding score of \
                 {NEUTRAL_PROPERTY_AGE:.1}/100 applied."
            ),
            detail: RiskDetail::PropertyAge {
                age_band: "unknown".to_string(),
                property_type: "unknown".to_string(),
                energy_rating: None,
            },
        }
    }

    pub fn locality(&self, evidence: &CrimeEvidence) -> RiskScore {
        let value = round1(rules::locality_score(
            &evidence.counts,
            self.config.locality_normalisation,
        ));
        let label = rules::locality_label(value);

        let mut ranked: Vec<_> = evidence.counts.iter().collect();
        ranked.sort_by(|left, right| right.1.cmp(left.1).then(left.0.cmp(right.0)));
        let top = ranked
            .iter()
            .take(4)
            .map(|(category, count)| format!("{} ({count})", category.label()))
            .collect::<Vec<_>>()
            .join(", ");

        let reasoning = format!(
            "{} recorded crimes near this location over {}. Top categories: {top}. Weighted crime \
             score {value:.1}/100 ({label}).",
            evidence.total(),
            evidence.period,
        );

        RiskScore {
            dimension: RiskDimension::Locality,
            value,
            label: label.to_string(),
            reasoning,
            detail: RiskDetail::Locality {
                period: evidence.period.clone(),
                total_crimes: evidence.total(),
                categories: evidence.counts.clone(),
            },
        }
    }

    pub fn neutral_locality(&self) -> RiskScore {
        RiskScore {
            dimension: RiskDimension::Locality,
            value: NEUTRAL_LOCALITY,
            label: rules::locality_label(NEUTRAL_LOCALITY).to_string(),
            reasoning: format!(
                "Crime data unavailable for this location; neutral holding score of \
                 {NEUTRAL_LOCALITY:.1}/100 applied."
            ),
            detail: RiskDetail::Locality {
                period: "unavailable".to_string(),
                total_crimes: 0,
                categories: BTreeMap::new(),
            },
        }
    }

    /// Deterministic composite decision.
    pub fn weighted_decision(&self, scores: &RiskScores) -> WeightedDecision {
        WeightedDecision::from_overall(weighted_overall(scores, &self.config.weights))
    }

    /// One explanation per dimension using the composite weights and each task's reasoning.
    pub fn explanations(&self, scores: &RiskScores) -> Vec<RiskFactorExplanation> {
        RiskDimension::EXPLANATION_ORDER
            .iter()
            .map(|dimension| {
                let score = scores.get(*dimension);
                RiskFactorExplanation {
                    name: dimension.factor_name().to_string(),
                    score: score.value,
                    weight: self.config.weights.weight(*dimension),
                    reasoning: score.reasoning.clone(),
                }
            })
            .collect()
    }
}

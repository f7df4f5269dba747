use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scoring::{Decision, WeightedDecision};

/// Identifier assigned to a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller input. Both fields are free text; address resolution belongs to the data sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub address: String,
    pub postcode: String,
}

impl AssessmentRequest {
    pub fn new(address: impl Into<String>, postcode: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            postcode: postcode.into(),
        }
    }

    /// A request is malformed only when there is nothing at all to locate.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() && self.postcode.trim().is_empty() {
            return Err("address and postcode are both empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The four weighted dimensions of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDimension {
    Planning,
    Flood,
    PropertyAge,
    Locality,
}

impl RiskDimension {
    /// Explanation order: heaviest weight first.
    pub const EXPLANATION_ORDER: [RiskDimension; 4] = [
        RiskDimension::Flood,
        RiskDimension::PropertyAge,
        RiskDimension::Planning,
        RiskDimension::Locality,
    ];

    pub fn factor_name(&self) -> &'static str {
        match self {
            RiskDimension::Planning => "Planning & Development Risk",
            RiskDimension::Flood => "Flood Risk",
            RiskDimension::PropertyAge => "Property Age Risk",
            RiskDimension::Locality => "Locality & Crime Risk",
        }
    }
}

/// Council development activity as published in planning statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ActivityLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "very high" => Some(Self::VeryHigh),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityLevel::Low => "Low",
            ActivityLevel::Moderate => "Moderate",
            ActivityLevel::High => "High",
            ActivityLevel::VeryHigh => "Very High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodZone {
    Zone1,
    Zone2,
    Zone3,
    Unknown,
}

impl FloodZone {
    pub fn risk_level(&self) -> &'static str {
        match self {
            FloodZone::Zone1 => "Very Low",
            FloodZone::Zone2 => "Low to Medium",
            FloodZone::Zone3 => "High",
            FloodZone::Unknown => "Unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FloodZone::Zone1 => "Zone 1",
            FloodZone::Zone2 => "Zone 2",
            FloodZone::Zone3 => "Zone 3",
            FloodZone::Unknown => "unknown zone",
        }
    }
}

/// Most severe live flood warning near the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    None,
    Alert,
    Warning,
    Severe,
}

impl WarningSeverity {
    pub fn label(&self) -> &'static str {
        match self {
            WarningSeverity::None => "no active warnings",
            WarningSeverity::Alert => "Flood Alert",
            WarningSeverity::Warning => "Flood Warning",
            WarningSeverity::Severe => "Severe Flood Warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnergyRating {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl EnergyRating {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            "F" => Some(Self::F),
            "G" => Some(Self::G),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrimeCategory {
    Burglary,
    CriminalDamageArson,
    Robbery,
    VehicleCrime,
    TheftFromPerson,
    Other,
}

impl CrimeCategory {
    /// Maps a published street-crime category slug onto the weighted set.
    pub fn from_slug(slug: &str) -> Self {
        match slug.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "burglary" => Self::Burglary,
            "criminal-damage-arson" => Self::CriminalDamageArson,
            "robbery" => Self::Robbery,
            "vehicle-crime" => Self::VehicleCrime,
            "theft-from-the-person" | "theft-from-person" => Self::TheftFromPerson,
            _ => Self::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CrimeCategory::Burglary => "burglary",
            CrimeCategory::CriminalDamageArson => "criminal damage and arson",
            CrimeCategory::Robbery => "robbery",
            CrimeCategory::VehicleCrime => "vehicle crime",
            CrimeCategory::TheftFromPerson => "theft from the person",
            CrimeCategory::Other => "other crime",
        }
    }
}

/// Dimension-specific auxiliary payload carried next to a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskDetail {
    Planning {
        activity_level: Option<ActivityLevel>,
        new_homes_approved: u32,
        refusal_rate: f64,
        nearby_applications: usize,
        appeals: u32,
        construction_component: f64,
    },
    Flood {
        zone: FloodZone,
        warning: WarningSeverity,
        flood_mentions: u32,
    },
    PropertyAge {
        age_band: String,
        property_type: String,
        energy_rating: Option<EnergyRating>,
    },
    Locality {
        period: String,
        total_crimes: u32,
        categories: BTreeMap<CrimeCategory, u32>,
    },
}

/// Immutable output of one risk task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub dimension: RiskDimension,
    pub value: f64,
    pub label: String,
    pub reasoning: String,
    pub detail: RiskDetail,
}

/// The four dimension scores of a run, in a fixed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScores {
    pub planning: RiskScore,
    pub flood: RiskScore,
    pub property_age: RiskScore,
    pub locality: RiskScore,
}

impl RiskScores {
    pub fn get(&self, dimension: RiskDimension) -> &RiskScore {
        match dimension {
            RiskDimension::Planning => &self.planning,
            RiskDimension::Flood => &self.flood,
            RiskDimension::PropertyAge => &self.property_age,
            RiskDimension::Locality => &self.locality,
        }
    }
}

/// Per-dimension explanation line shown next to the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactorExplanation {
    pub name: String,
    pub score: f64,
    pub weight: f64,
    pub reasoning: String,
}

/// A retrieved underwriting-policy passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyExcerpt {
    pub title: String,
    pub section: String,
    pub text: String,
}

impl PolicyExcerpt {
    pub fn citation(&self) -> String {
        format!("{} – {}", self.title, self.section)
    }
}

/// Final output of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub run_id: RunId,
    pub address: String,
    pub postcode: String,
    pub assessed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: WeightedDecision,
    pub underwriter_reasoning: String,
    pub risk_factors: Vec<RiskFactorExplanation>,
    pub narrative: String,
    pub policy_citations: Vec<String>,
    pub data_warnings: Vec<String>,
    pub scores: RiskScores,
}

impl AssessmentResult {
    pub fn decision(&self) -> Decision {
        self.outcome.decision
    }
}

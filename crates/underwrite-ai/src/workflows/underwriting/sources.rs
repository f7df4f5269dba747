//! Boundary contracts for the external data feeds behind each risk task.
//!
//! Implementations perform network I/O and are expected to suspend rather than block. Ordinary
//! data unavailability is reported through the recoverable [`SourceError`] variants; only
//! [`SourceError::Misconfigured`] aborts a run.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{
    ActivityLevel, AssessmentRequest, Coordinates, CrimeCategory, EnergyRating, FloodZone,
    PolicyExcerpt, WarningSeverity,
};

/// Council-level planning statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CouncilStats {
    pub activity_level: Option<ActivityLevel>,
    pub new_homes_approved: u32,
    /// Percentage, 0–100.
    pub refusal_rate: f64,
}

/// One planning application near the property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningApplication {
    pub reference: String,
    pub heading: String,
    pub appealed: bool,
}

/// Geocoding plus planning-register evidence for the first stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanningEvidence {
    pub coordinates: Option<Coordinates>,
    pub council: Option<CouncilStats>,
    pub applications: Vec<PlanningApplication>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloodEvidence {
    pub zone: FloodZone,
    pub most_severe_warning: WarningSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyCertificate {
    pub construction_age_band: String,
    pub property_type: String,
    pub energy_rating: Option<EnergyRating>,
}

/// Street-level crime counts over the trailing twelve months.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrimeEvidence {
    pub period: String,
    pub counts: BTreeMap<CrimeCategory, u32>,
}

impl CrimeEvidence {
    pub fn total(&self) -> u32 {
        self.counts
            .values()
            .fold(0u32, |total, count| total.saturating_add(*count))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("returned no data")]
    Empty,
    #[error("returned malformed data: {0}")]
    Malformed(String),
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Misconfigured(_))
    }
}

#[async_trait]
pub trait PlanningSource: Send + Sync {
    async fn survey(&self, request: &AssessmentRequest) -> Result<PlanningEvidence, SourceError>;
}

#[async_trait]
pub trait FloodSource: Send + Sync {
    async fn flood_profile(&self, location: Coordinates) -> Result<FloodEvidence, SourceError>;
}

#[async_trait]
pub trait EnergyCertificateSource: Send + Sync {
    async fn certificate(
        &self,
        request: &AssessmentRequest,
    ) -> Result<EnergyCertificate, SourceError>;
}

#[async_trait]
pub trait CrimeSource: Send + Sync {
    async fn crimes(&self, location: Coordinates) -> Result<CrimeEvidence, SourceError>;
}

#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize)
        -> Result<Vec<PolicyExcerpt>, SourceError>;
}

const FLOOD_TERMS: [&str; 7] = [
    "flood",
    "drainage",
    "culvert",
    "watercourse",
    "suds",
    "sustainable drainage",
    "flood defence",
];

/// Nearby applications whose heading mentions flood-relevant works.
pub fn flood_relevant_mentions(applications: &[PlanningApplication]) -> u32 {
    let count = applications
        .iter()
        .filter(|application| {
            let heading = application.heading.to_ascii_lowercase();
            FLOOD_TERMS.iter().any(|term| heading.contains(term))
        })
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

pub fn appeal_count(applications: &[PlanningApplication]) -> u32 {
    let count = applications
        .iter()
        .filter(|application| application.appealed)
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

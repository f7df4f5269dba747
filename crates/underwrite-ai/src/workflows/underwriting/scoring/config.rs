use serde::{Deserialize, Serialize};

use super::super::domain::RiskDimension;

/// Composite weighting applied when the decision stage falls back to the formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub flood: f64,
    pub property_age: f64,
    pub planning: f64,
    pub locality: f64,
}

impl DimensionWeights {
    pub fn weight(&self, dimension: RiskDimension) -> f64 {
        match dimension {
            RiskDimension::Flood => self.flood,
            RiskDimension::PropertyAge => self.property_age,
            RiskDimension::Planning => self.planning,
            RiskDimension::Locality => self.locality,
        }
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            flood: 0.40,
            property_age: 0.25,
            planning: 0.20,
            locality: 0.15,
        }
    }
}

/// Tunables for the scoring rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: DimensionWeights,
    /// Weighted crime points per score unit over the 12-month window (8 per month).
    pub locality_normalisation: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            locality_normalisation: 96.0,
        }
    }
}

/// Scores substituted when a dimension's data source degrades.
pub(crate) const NEUTRAL_PLANNING: f64 = 10.0;
pub(crate) const NEUTRAL_FLOOD: f64 = 20.0;
pub(crate) const NEUTRAL_PROPERTY_AGE: f64 = 30.0;
pub(crate) const NEUTRAL_LOCALITY: f64 = 25.0;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one task in the stage plan. Also the wire `stage_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    PropertyValuation,
    FloodRisk,
    PropertyAge,
    LocalitySafety,
    PolicyRetrieval,
    DecisionSynthesis,
    Explanation,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::PropertyValuation => "property_valuation",
            StageId::FloodRisk => "flood_risk",
            StageId::PropertyAge => "property_age",
            StageId::LocalitySafety => "locality_safety",
            StageId::PolicyRetrieval => "policy_retrieval",
            StageId::DecisionSynthesis => "decision_synthesis",
            StageId::Explanation => "explanation",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage: the tasks it runs together and the earlier stages it waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub tasks: &'static [StageId],
    pub depends_on: &'static [usize],
}

impl StageDescriptor {
    pub fn is_parallel(&self) -> bool {
        self.tasks.len() > 1
    }
}

/// The fixed plan: solo, parallel group of three, then three solo stages in sequence.
pub const STAGE_PLAN: [StageDescriptor; 5] = [
    StageDescriptor {
        tasks: &[StageId::PropertyValuation],
        depends_on: &[],
    },
    StageDescriptor {
        tasks: &[StageId::FloodRisk, StageId::PropertyAge, StageId::LocalitySafety],
        depends_on: &[0],
    },
    StageDescriptor {
        tasks: &[StageId::PolicyRetrieval],
        depends_on: &[0, 1],
    },
    StageDescriptor {
        tasks: &[StageId::DecisionSynthesis],
        depends_on: &[2],
    },
    StageDescriptor {
        tasks: &[StageId::Explanation],
        depends_on: &[3],
    },
];

use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::plan::StageId;
use crate::workflows::underwriting::domain::AssessmentResult;

/// Progress event of a single run, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        stage_id: StageId,
    },
    /// Also emitted when the task degraded; the warnings say how.
    StageCompleted {
        stage_id: StageId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    StageFailed {
        stage_id: StageId,
        error: PipelineError,
    },
    PipelineCompleted {
        result: Box<AssessmentResult>,
    },
    PipelineFailed {
        error: PipelineError,
    },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::PipelineCompleted { .. } | PipelineEvent::PipelineFailed { .. }
        )
    }

    pub fn stage_id(&self) -> Option<StageId> {
        match self {
            PipelineEvent::StageStarted { stage_id }
            | PipelineEvent::StageCompleted { stage_id, .. }
            | PipelineEvent::StageFailed { stage_id, .. } => Some(*stage_id),
            PipelineEvent::PipelineCompleted { .. } | PipelineEvent::PipelineFailed { .. } => None,
        }
    }
}

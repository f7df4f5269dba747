use serde::{Deserialize, Serialize};

use super::plan::StageId;

/// Unrecoverable failure of a run. The only error a pipeline caller ever sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[error("stage {stage} failed: {reason}")]
    StageFailed { stage: StageId, reason: String },
    #[error("deadline exceeded after {after_ms} ms")]
    DeadlineExceeded { after_ms: u64 },
    #[error("run cancelled")]
    Cancelled,
    #[error("internal pipeline error: {reason}")]
    Internal { reason: String },
}

impl PipelineError {
    /// Stable wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest { .. } => "invalid_request",
            PipelineError::StageFailed { .. } => "stage_failed",
            PipelineError::DeadlineExceeded { .. } => "deadline_exceeded",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Internal { .. } => "internal",
        }
    }
}

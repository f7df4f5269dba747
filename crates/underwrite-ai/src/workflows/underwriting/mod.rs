//! Property underwriting: risk tasks, scoring, synthesis and the staged pipeline that runs them.

pub mod domain;
pub mod pipeline;
pub mod scoring;
pub mod sources;
pub mod stream;
pub mod synthesis;
mod tasks;

pub use domain::{
    AssessmentRequest, AssessmentResult, Coordinates, PolicyExcerpt, RiskDimension,
    RiskFactorExplanation, RiskScore, RiskScores, RunId,
};
pub use pipeline::{
    CancellationToken, PipelineConfig, PipelineError, PipelineEvent, RiskSources, StageId,
    UnderwritingPipeline,
};
pub use scoring::{Decision, ScoringConfig, ScoringEngine, WeightedDecision};
pub use stream::{encode_line, ndjson_lines, EventStream, END_OF_STREAM};
pub use synthesis::{GenerativeCapability, OfflineCapability};

#[cfg(test)]
mod tests;

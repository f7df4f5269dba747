//! Stage graph executor: the fixed plan, its events and run control.

mod cancel;
mod error;
mod events;
mod executor;
mod plan;

pub use cancel::CancellationToken;
pub use error::PipelineError;
pub use events::PipelineEvent;
pub use executor::{PipelineConfig, RiskSources, UnderwritingPipeline};
pub use plan::{StageDescriptor, StageId, STAGE_PLAN};

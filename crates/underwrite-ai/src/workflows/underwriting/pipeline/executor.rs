use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cancel::CancellationToken;
use super::error::PipelineError;
use super::events::PipelineEvent;
use super::plan::{StageDescriptor, StageId, STAGE_PLAN};
use crate::workflows::underwriting::domain::{AssessmentRequest, AssessmentResult, RiskScores, RunId};
use crate::workflows::underwriting::scoring::{ScoringConfig, ScoringEngine};
use crate::workflows::underwriting::sources::{
    CrimeSource, EnergyCertificateSource, FloodSource, PlanningSource, PolicySource, SourceError,
};
use crate::workflows::underwriting::stream::{self, EventSink, EventStream};
use crate::workflows::underwriting::synthesis::{
    fallback, GenerativeCapability, Synthesis, SynthesisAdapter,
};
use crate::workflows::underwriting::tasks::{self, TaskOutput};

/// Timeouts and channel sizing for pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub run_deadline: Duration,
    pub stage_timeout: Duration,
    pub synthesis_timeout: Duration,
    pub event_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_deadline: Duration::from_secs(120),
            stage_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(20),
            event_buffer: 16,
        }
    }
}

/// Data sources injected into every run.
#[derive(Clone)]
pub struct RiskSources {
    pub planning: Arc<dyn PlanningSource>,
    pub flood: Arc<dyn FloodSource>,
    pub energy: Arc<dyn EnergyCertificateSource>,
    pub crime: Arc<dyn CrimeSource>,
    pub policies: Arc<dyn PolicySource>,
}

/// Runs the fixed stage plan for one request at a time per call.
#[derive(Clone)]
pub struct UnderwritingPipeline {
    sources: RiskSources,
    synthesis: SynthesisAdapter,
    engine: ScoringEngine,
    config: PipelineConfig,
}

impl UnderwritingPipeline {
    pub fn new(
        sources: RiskSources,
        capability: Arc<dyn GenerativeCapability>,
        scoring: ScoringConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            sources,
            synthesis: SynthesisAdapter::new(capability, config.synthesis_timeout),
            engine: ScoringEngine::new(scoring),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Starts a fresh run on the current tokio runtime and returns its event stream.
    pub fn run(&self, request: AssessmentRequest) -> EventStream {
        self.run_with_cancellation(request, CancellationToken::new())
    }

    pub fn run_with_cancellation(
        &self,
        request: AssessmentRequest,
        cancel: CancellationToken,
    ) -> EventStream {
        let run_id = RunId::new();
        let (sink, events) = stream::channel(run_id, self.config.event_buffer);
        let span = info_span!("underwriting_run", run_id = %run_id, postcode = %request.postcode);

        let pipeline = self.clone();
        let worker_sink = sink.clone();
        let worker = tokio::spawn(
            async move { pipeline.drive(run_id, request, worker_sink, cancel).await }
                .instrument(span),
        );

        tokio::spawn(async move {
            if let Err(err) = worker.await {
                if err.is_panic() {
                    warn!(%run_id, "underwriting run panicked");
                    sink.finish(PipelineEvent::PipelineFailed {
                        error: PipelineError::Internal {
                            reason: "run aborted unexpectedly".to_string(),
                        },
                    })
                    .await;
                }
            }
        });

        events
    }

    /// Non-streaming mode: drains the run and returns only its terminal outcome.
    pub async fn run_to_completion(
        &self,
        request: AssessmentRequest,
    ) -> Result<AssessmentResult, PipelineError> {
        self.run(request).into_result().await
    }

    async fn drive(
        &self,
        run_id: RunId,
        request: AssessmentRequest,
        sink: EventSink,
        cancel: CancellationToken,
    ) {
        let deadline = self.config.run_deadline;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            _ = tokio::time::sleep(deadline) => Err(PipelineError::DeadlineExceeded {
                after_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }),
            _ = sink.detached() => {
                debug!("event consumer detached; abandoning run");
                return;
            }
            outcome = self.execute(run_id, &request, &sink) => outcome,
        };

        match outcome {
            Ok(result) => {
                info!(
                    decision = result.decision().label(),
                    overall_score = result.outcome.overall_score,
                    data_warnings = result.data_warnings.len(),
                    "underwriting run completed"
                );
                sink.finish(PipelineEvent::PipelineCompleted {
                    result: Box::new(result),
                })
                .await;
            }
            Err(error) => {
                warn!(kind = error.kind(), %error, "underwriting run failed");
                sink.finish(PipelineEvent::PipelineFailed { error }).await;
            }
        }
    }

    async fn execute(
        &self,
        run_id: RunId,
        request: &AssessmentRequest,
        sink: &EventSink,
    ) -> Result<AssessmentResult, PipelineError> {
        let stage_timeout = self.config.stage_timeout;
        let mut data_warnings = Vec::new();

        start(sink, &STAGE_PLAN[0]).await;
        if let Err(reason) = request.validate() {
            let error = PipelineError::InvalidRequest { reason };
            sink.emit(PipelineEvent::StageFailed {
                stage_id: StageId::PropertyValuation,
                error: error.clone(),
            })
            .await;
            return Err(error);
        }
        let survey = settle(
            sink,
            StageId::PropertyValuation,
            tasks::survey_site(
                self.sources.planning.as_ref(),
                &self.synthesis,
                &self.engine,
                request,
                stage_timeout,
            )
            .await,
        )
        .await?;
        data_warnings.extend(survey.warnings);
        let survey = survey.value;

        start(sink, &STAGE_PLAN[1]).await;
        let (flood, property_age, locality) = tokio::join!(
            async {
                let output = tasks::assess_flood(
                    self.sources.flood.as_ref(),
                    &self.engine,
                    &survey,
                    stage_timeout,
                )
                .await;
                settle(sink, StageId::FloodRisk, output).await
            },
            async {
                let output = tasks::assess_property_age(
                    self.sources.energy.as_ref(),
                    &self.engine,
                    request,
                    stage_timeout,
                )
                .await;
                settle(sink, StageId::PropertyAge, output).await
            },
            async {
                let output = tasks::assess_locality(
                    self.sources.crime.as_ref(),
                    &self.engine,
                    &survey,
                    stage_timeout,
                )
                .await;
                settle(sink, StageId::LocalitySafety, output).await
            },
        );
        let (flood, property_age, locality) = (flood?, property_age?, locality?);
        for output in [&flood, &property_age, &locality] {
            data_warnings.extend(output.warnings.iter().cloned());
        }

        let scores = RiskScores {
            planning: survey.planning,
            flood: flood.value,
            property_age: property_age.value,
            locality: locality.value,
        };

        start(sink, &STAGE_PLAN[2]).await;
        let policies = settle(
            sink,
            StageId::PolicyRetrieval,
            tasks::retrieve_policies(self.sources.policies.as_ref(), &scores, stage_timeout).await,
        )
        .await?;
        data_warnings.extend(policies.warnings);
        let policies = policies.value;

        start(sink, &STAGE_PLAN[3]).await;
        let weights = &self.engine.config().weights;
        let decision = match self.synthesis.decide(&scores, weights, &policies).await {
            Synthesis::Ok(decision) => TaskOutput {
                value: decision,
                warnings: Vec::new(),
            },
            Synthesis::Degraded(reason) => TaskOutput {
                value: fallback::decision(&self.engine, &scores, &reason),
                warnings: vec![format!(
                    "Decision synthesis degraded ({reason}); deterministic weighted formula applied."
                )],
            },
        };
        let decision = settle(sink, StageId::DecisionSynthesis, Ok(decision)).await?;
        data_warnings.extend(decision.warnings);
        let decision = decision.value;

        start(sink, &STAGE_PLAN[4]).await;
        let explanation = match self
            .synthesis
            .explain(
                request,
                &scores,
                weights,
                &decision.outcome,
                &decision.underwriter_reasoning,
                &policies,
            )
            .await
        {
            Synthesis::Ok(explanation) => TaskOutput {
                value: explanation,
                warnings: Vec::new(),
            },
            Synthesis::Degraded(reason) => TaskOutput {
                value: fallback::explanation(&self.engine, &scores, &decision.outcome, &policies),
                warnings: vec![format!(
                    "Explanation synthesis degraded ({reason}); templated explanation applied."
                )],
            },
        };
        let explanation = settle(sink, StageId::Explanation, Ok(explanation)).await?;
        data_warnings.extend(explanation.warnings);
        let explanation = explanation.value;

        Ok(AssessmentResult {
            run_id,
            address: request.address.clone(),
            postcode: request.postcode.clone(),
            assessed_at: Utc::now(),
            outcome: decision.outcome,
            underwriter_reasoning: decision.underwriter_reasoning,
            risk_factors: explanation.risk_factors,
            narrative: explanation.narrative,
            policy_citations: explanation.policy_citations,
            data_warnings,
            scores,
        })
    }
}

/// Emits every start event of a stage before any of its tasks is polled.
async fn start(sink: &EventSink, stage: &StageDescriptor) {
    for stage_id in stage.tasks {
        debug!(stage = %stage_id, "stage started");
        sink.emit(PipelineEvent::StageStarted {
            stage_id: *stage_id,
        })
        .await;
    }
}

async fn settle<T>(
    sink: &EventSink,
    stage_id: StageId,
    output: Result<TaskOutput<T>, SourceError>,
) -> Result<TaskOutput<T>, PipelineError> {
    match output {
        Ok(output) => {
            for warning in &output.warnings {
                warn!(stage = %stage_id, %warning, "stage degraded");
            }
            debug!(stage = %stage_id, "stage completed");
            sink.emit(PipelineEvent::StageCompleted {
                stage_id,
                warnings: output.warnings.clone(),
            })
            .await;
            Ok(output)
        }
        Err(err) => {
            let error = PipelineError::StageFailed {
                stage: stage_id,
                reason: err.to_string(),
            };
            sink.emit(PipelineEvent::StageFailed {
                stage_id,
                error: error.clone(),
            })
            .await;
            Err(error)
        }
    }
}

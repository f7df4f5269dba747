use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::common::*;
use crate::workflows::underwriting::domain::{AssessmentRequest, RiskDimension};
use crate::workflows::underwriting::pipeline::{
    CancellationToken, PipelineConfig, PipelineError, PipelineEvent, StageId,
    UnderwritingPipeline,
};
use crate::workflows::underwriting::scoring::{Decision, ScoringConfig};
use crate::workflows::underwriting::sources::PlanningSource;
use crate::workflows::underwriting::sources::{PlanningEvidence, SourceError};
use crate::workflows::underwriting::synthesis::PromptPurpose;

const PARALLEL_GROUP: [StageId; 3] = [
    StageId::FloodRisk,
    StageId::PropertyAge,
    StageId::LocalitySafety,
];

fn is_started(event: &PipelineEvent, stage: StageId) -> bool {
    matches!(event, PipelineEvent::StageStarted { stage_id } if *stage_id == stage)
}

fn completed_order(events: &[PipelineEvent]) -> Vec<StageId> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::StageCompleted { stage_id, .. } => Some(*stage_id),
            _ => None,
        })
        .collect()
}

fn completed_result(events: &[PipelineEvent]) -> &crate::workflows::underwriting::AssessmentResult {
    match terminal(events) {
        PipelineEvent::PipelineCompleted { result } => result,
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn run_emits_exactly_one_terminal_event_last() {
    let sources = SourceSet::healthy();
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let events = collect(pipeline.run(request())).await;

    assert_eq!(events.len(), 15, "events: {events:?}");
    assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
    assert!(terminal(&events).is_terminal());
    assert!(matches!(
        terminal(&events),
        PipelineEvent::PipelineCompleted { .. }
    ));
}

#[tokio::test]
async fn parallel_group_starts_are_contiguous_and_precede_its_completions() {
    let sources = SourceSet::healthy();
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let events = collect(pipeline.run(request())).await;

    assert!(is_started(&events[0], StageId::PropertyValuation));
    assert!(matches!(
        events[1],
        PipelineEvent::StageCompleted {
            stage_id: StageId::PropertyValuation,
            ..
        }
    ));
    for (offset, stage) in PARALLEL_GROUP.iter().enumerate() {
        assert!(is_started(&events[2 + offset], *stage), "events: {events:?}");
    }
    let group_completions: Vec<_> = completed_order(&events[5..8]);
    assert_eq!(group_completions.len(), 3);
    for stage in PARALLEL_GROUP {
        assert!(group_completions.contains(&stage));
    }
    assert!(is_started(&events[8], StageId::PolicyRetrieval));
}

#[tokio::test(start_paused = true)]
async fn parallel_group_runs_concurrently() {
    let mut sources = SourceSet::healthy();
    sources.flood = Arc::new(Scripted::ok(flood_evidence()).delayed(Duration::from_millis(300)));
    sources.energy = Arc::new(Scripted::ok(certificate()).delayed(Duration::from_millis(200)));
    sources.crime = Arc::new(Scripted::ok(crime_evidence()).delayed(Duration::from_millis(100)));
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let started = tokio::time::Instant::now();
    let events = collect(pipeline.run(request())).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(600), "elapsed {elapsed:?}");
    assert_eq!(
        completed_order(&events[5..8]),
        vec![
            StageId::LocalitySafety,
            StageId::PropertyAge,
            StageId::FloodRisk
        ]
    );
}

#[tokio::test]
async fn deterministic_path_scores_every_dimension() {
    let sources = SourceSet::healthy();
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let result = pipeline
        .run_to_completion(request())
        .await
        .expect("run completes");

    assert_eq!(result.scores.flood.value, EXPECTED_FLOOD);
    assert_eq!(result.scores.property_age.value, EXPECTED_PROPERTY_AGE);
    assert_eq!(result.scores.locality.value, EXPECTED_LOCALITY);
    assert_eq!(result.scores.planning.value, EXPECTED_PLANNING_FALLBACK);
    // 59 * 0.40 + 52 * 0.25 + 15 * 0.20 + 11.5 * 0.15
    assert_eq!(result.outcome.overall_score, 41.3);
    assert_eq!(result.outcome.premium_multiplier, 1.83);
    assert_eq!(result.decision(), Decision::Accept);
    assert_eq!(
        result.policy_citations,
        vec![
            "Flood Risk Underwriting Guidelines – Section 2.1".to_string(),
            "Property Age Guidelines – Section 3.2".to_string(),
        ]
    );
    assert!(result.narrative.contains("ACCEPT"));
    assert!(result
        .underwriter_reasoning
        .starts_with("Deterministic fallback applied"));
    assert_eq!(result.address, "14 Platt Lane, Manchester");
    assert_eq!(result.postcode, "M14 5TL");
}

#[tokio::test(start_paused = true)]
async fn hanging_capability_degrades_to_weighted_formula() {
    let sources = SourceSet::healthy();
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::hanging()));

    let result = pipeline
        .run_to_completion(request())
        .await
        .expect("run completes despite synthesis timeouts");

    assert_eq!(result.outcome.overall_score, 41.3);
    assert_eq!(result.decision(), Decision::Accept);
    assert!(result
        .data_warnings
        .iter()
        .any(|warning| warning.starts_with("Decision synthesis degraded")));
    assert!(result
        .data_warnings
        .iter()
        .any(|warning| warning.starts_with("Explanation synthesis degraded")));
    let names: Vec<_> = result
        .risk_factors
        .iter()
        .map(|factor| factor.name.as_str())
        .collect();
    let expected: Vec<_> = RiskDimension::EXPLANATION_ORDER
        .iter()
        .map(|dimension| dimension.factor_name())
        .collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn empty_locality_takes_neutral_default_without_touching_siblings() {
    let mut sources = SourceSet::healthy();
    sources.crime = Arc::new(Scripted::failing(SourceError::Empty));
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let events = collect(pipeline.run(request())).await;
    let result = completed_result(&events);

    assert_eq!(result.scores.locality.value, 25.0);
    assert_eq!(result.scores.locality.label, "Low Crime");
    assert_eq!(result.scores.flood.value, EXPECTED_FLOOD);
    assert_eq!(result.scores.property_age.value, EXPECTED_PROPERTY_AGE);
    assert!(result
        .data_warnings
        .iter()
        .any(|warning| warning.starts_with("Crime data source returned no data")));

    let locality_warnings = events.iter().find_map(|event| match event {
        PipelineEvent::StageCompleted {
            stage_id: StageId::LocalitySafety,
            warnings,
        } => Some(warnings.clone()),
        _ => None,
    });
    assert_eq!(locality_warnings.map(|warnings| warnings.len()), Some(1));
    assert!(!events
        .iter()
        .any(|event| matches!(event, PipelineEvent::StageFailed { .. })));
}

#[tokio::test]
async fn missing_coordinates_skip_location_sources() {
    let mut sources = SourceSet::healthy();
    sources.planning = Arc::new(Scripted::ok(PlanningEvidence {
        coordinates: None,
        ..planning_evidence()
    }));
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let result = pipeline
        .run_to_completion(request())
        .await
        .expect("run completes");

    assert_eq!(result.scores.planning.value, 10.0);
    assert_eq!(result.scores.planning.label, "Low");
    assert_eq!(result.scores.flood.value, 20.0);
    assert_eq!(result.scores.locality.value, 25.0);
    assert_eq!(result.scores.property_age.value, EXPECTED_PROPERTY_AGE);
    assert_eq!(sources.flood.calls(), 0);
    assert_eq!(sources.crime.calls(), 0);
    assert!(result
        .data_warnings
        .iter()
        .any(|warning| warning.contains("could not be geocoded")));
}

#[tokio::test]
async fn synthesised_decision_overrides_formula_when_valid() {
    let sources = SourceSet::healthy();
    let capability = Arc::new(
        ScriptedCapability::new()
            .replying(PromptPurpose::ConstructionRisk, construction_reply(6.0))
            .replying(
                PromptPurpose::DecisionSynthesis,
                decision_reply(64.0, 2.28, "refer"),
            )
            .replying(PromptPurpose::Explanation, explanation_reply()),
    );
    let pipeline = pipeline(&sources, capability.clone());

    let result = pipeline
        .run_to_completion(request())
        .await
        .expect("run completes");

    assert_eq!(result.scores.planning.value, 21.0);
    assert_eq!(result.outcome.overall_score, 64.0);
    assert_eq!(result.outcome.premium_multiplier, 2.28);
    assert_eq!(result.decision(), Decision::Refer);
    assert!(result.data_warnings.is_empty(), "{:?}", result.data_warnings);
    assert_eq!(
        result.policy_citations,
        vec!["Flood Risk Underwriting Guidelines – Section 2.1".to_string()]
    );
    assert_eq!(
        capability.calls(),
        vec![
            PromptPurpose::ConstructionRisk,
            PromptPurpose::DecisionSynthesis,
            PromptPurpose::Explanation
        ]
    );
}

#[tokio::test]
async fn inconsistent_synthesised_decision_is_degraded() {
    let sources = SourceSet::healthy();
    let capability = Arc::new(ScriptedCapability::new().replying(
        PromptPurpose::DecisionSynthesis,
        decision_reply(72.0, 2.44, "accept"),
    ));
    let pipeline = pipeline(&sources, capability);

    let result = pipeline
        .run_to_completion(request())
        .await
        .expect("run completes");

    assert_eq!(result.outcome.overall_score, 41.3);
    assert!(result
        .data_warnings
        .iter()
        .any(|warning| warning.starts_with("Decision synthesis degraded (reply failed validation")));
}

#[tokio::test]
async fn synthesised_score_just_below_decline_band_stays_refer() {
    let sources = SourceSet::healthy();
    let capability = Arc::new(ScriptedCapability::new().replying(
        PromptPurpose::DecisionSynthesis,
        decision_reply(79.96, 2.59, "refer"),
    ));
    let pipeline = pipeline(&sources, capability);

    let result = pipeline
        .run_to_completion(request())
        .await
        .expect("run completes");

    assert_eq!(result.decision(), Decision::Refer);
    assert_eq!(result.outcome.premium_multiplier, 2.59);
    assert!(
        !result
            .data_warnings
            .iter()
            .any(|warning| warning.starts_with("Decision synthesis degraded")),
        "{:?}",
        result.data_warnings
    );
}

#[tokio::test]
async fn fenced_replies_are_accepted() {
    let sources = SourceSet::healthy();
    let fenced = format!("```json\n{}\n```", decision_reply(81.5, 2.63, "decline"));
    let capability =
        Arc::new(ScriptedCapability::new().replying(PromptPurpose::DecisionSynthesis, fenced));
    let pipeline = pipeline(&sources, capability);

    let result = pipeline
        .run_to_completion(request())
        .await
        .expect("run completes");

    assert_eq!(result.decision(), Decision::Decline);
    assert_eq!(result.outcome.overall_score, 81.5);
}

#[tokio::test]
async fn blank_request_fails_the_first_stage() {
    let sources = SourceSet::healthy();
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let events = collect(pipeline.run(AssessmentRequest::new("  ", ""))).await;

    assert_eq!(events.len(), 3, "events: {events:?}");
    assert!(is_started(&events[0], StageId::PropertyValuation));
    assert!(matches!(
        &events[1],
        PipelineEvent::StageFailed {
            stage_id: StageId::PropertyValuation,
            error: PipelineError::InvalidRequest { .. },
        }
    ));
    assert!(matches!(
        terminal(&events),
        PipelineEvent::PipelineFailed {
            error: PipelineError::InvalidRequest { .. }
        }
    ));
    assert_eq!(sources.planning.calls(), 0);
}

#[tokio::test]
async fn misconfigured_source_is_fatal_after_group_settles() {
    let mut sources = SourceSet::healthy();
    sources.flood = Arc::new(Scripted::failing(SourceError::Misconfigured(
        "missing API key".to_string(),
    )));
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let events = collect(pipeline.run(request())).await;

    assert!(events.iter().any(|event| matches!(
        event,
        PipelineEvent::StageFailed {
            stage_id: StageId::FloodRisk,
            ..
        }
    )));
    let completed = completed_order(&events);
    assert!(completed.contains(&StageId::PropertyAge));
    assert!(completed.contains(&StageId::LocalitySafety));
    assert!(!events
        .iter()
        .any(|event| is_started(event, StageId::PolicyRetrieval)));
    match terminal(&events) {
        PipelineEvent::PipelineFailed {
            error: PipelineError::StageFailed { stage, reason },
        } => {
            assert_eq!(*stage, StageId::FloodRisk);
            assert!(reason.contains("missing API key"));
        }
        other => panic!("expected stage failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_the_run_and_stops_events() {
    let mut sources = SourceSet::healthy();
    sources.planning =
        Arc::new(Scripted::ok(planning_evidence()).delayed(Duration::from_secs(10)));
    let config = PipelineConfig {
        run_deadline: Duration::from_secs(1),
        stage_timeout: Duration::from_secs(30),
        ..test_config()
    };
    let pipeline = pipeline_with(&sources, Arc::new(ScriptedCapability::new()), config);

    let events = collect(pipeline.run(request())).await;

    assert_eq!(events.len(), 2, "events: {events:?}");
    assert!(is_started(&events[0], StageId::PropertyValuation));
    assert_eq!(
        terminal(&events),
        &PipelineEvent::PipelineFailed {
            error: PipelineError::DeadlineExceeded { after_ms: 1_000 }
        }
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_terminates_with_cancelled() {
    let mut sources = SourceSet::healthy();
    sources.planning =
        Arc::new(Scripted::ok(planning_evidence()).delayed(Duration::from_secs(10)));
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));
    let token = CancellationToken::new();

    let mut events = pipeline.run_with_cancellation(request(), token.clone());
    let first = events.next_event().await.expect("first event");
    assert!(is_started(&first, StageId::PropertyValuation));
    token.cancel();

    let rest = collect(events).await;
    assert_eq!(
        rest,
        vec![PipelineEvent::PipelineFailed {
            error: PipelineError::Cancelled
        }]
    );
}

#[tokio::test]
async fn repeated_runs_are_independent() {
    let sources = SourceSet::healthy();
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let first = pipeline.run(request());
    let second = pipeline.run(request());
    assert_ne!(first.run_id(), second.run_id());

    let (first, second) = tokio::join!(first.into_result(), second.into_result());
    let (first, second) = (first.expect("first run"), second.expect("second run"));

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.scores, second.scores);
    assert_eq!(first.outcome, second.outcome);
    assert_eq!(sources.planning.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_source_times_out_to_its_neutral_score() {
    let mut sources = SourceSet::healthy();
    sources.energy = Arc::new(Scripted::ok(certificate()).delayed(Duration::from_secs(5)));
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let events = collect(pipeline.run(request())).await;
    let result = completed_result(&events);

    assert_eq!(result.scores.property_age.value, 30.0);
    assert_eq!(result.scores.flood.value, EXPECTED_FLOOD);
    assert!(
        result.data_warnings.iter().any(|warning| {
            warning.starts_with("Energy certificate source unavailable: timed out")
        }),
        "{:?}",
        result.data_warnings
    );
}

struct ExplodingPlanning;

#[async_trait]
impl PlanningSource for ExplodingPlanning {
    async fn survey(&self, _request: &AssessmentRequest) -> Result<PlanningEvidence, SourceError> {
        panic!("planning lookup exploded");
    }
}

#[tokio::test]
async fn panicking_task_fails_the_run_with_internal_error() {
    let sources = SourceSet::healthy();
    let mut risk_sources = sources.risk_sources();
    risk_sources.planning = Arc::new(ExplodingPlanning);
    let pipeline = UnderwritingPipeline::new(
        risk_sources,
        Arc::new(ScriptedCapability::new()),
        ScoringConfig::default(),
        test_config(),
    );

    let events = collect(pipeline.run(request())).await;

    assert_eq!(events.len(), 2, "events: {events:?}");
    assert!(is_started(&events[0], StageId::PropertyValuation));
    assert_eq!(
        terminal(&events),
        &PipelineEvent::PipelineFailed {
            error: PipelineError::Internal {
                reason: "run aborted unexpectedly".to_string()
            }
        }
    );
    assert_eq!(sources.flood.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_abandons_the_run() {
    let mut sources = SourceSet::healthy();
    sources.planning =
        Arc::new(Scripted::ok(planning_evidence()).delayed(Duration::from_secs(2)));
    let pipeline = pipeline(&sources, Arc::new(ScriptedCapability::new()));

    let mut events = pipeline.run(request());
    let first = events.next_event().await.expect("first event");
    assert!(is_started(&first, StageId::PropertyValuation));
    drop(events);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(sources.planning.calls() <= 1);
    assert_eq!(sources.flood.calls(), 0);
    assert_eq!(sources.energy.calls(), 0);
    assert_eq!(sources.crime.calls(), 0);
    assert_eq!(sources.policies.calls(), 0);
}

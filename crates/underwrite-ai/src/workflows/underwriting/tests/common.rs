use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::workflows::underwriting::domain::{
    ActivityLevel, AssessmentRequest, Coordinates, CrimeCategory, EnergyRating, FloodZone,
    PolicyExcerpt, WarningSeverity,
};
use crate::workflows::underwriting::pipeline::{
    PipelineConfig, PipelineEvent, RiskSources, UnderwritingPipeline,
};
use crate::workflows::underwriting::scoring::ScoringConfig;
use crate::workflows::underwriting::sources::{
    CouncilStats, CrimeEvidence, CrimeSource, EnergyCertificate, EnergyCertificateSource,
    FloodEvidence, FloodSource, PlanningApplication, PlanningEvidence, PlanningSource,
    PolicySource, SourceError,
};
use crate::workflows::underwriting::stream::EventStream;
use crate::workflows::underwriting::synthesis::{
    CapabilityError, GenerativeCapability, PromptPurpose, StructuredPrompt,
};

pub(super) fn request() -> AssessmentRequest {
    AssessmentRequest::new("14 Platt Lane, Manchester", "M14 5TL")
}

pub(super) fn location() -> Coordinates {
    Coordinates {
        latitude: 53.4509,
        longitude: -2.2224,
    }
}

/// Moderate council, one flood-relevant heading, no appeals.
pub(super) fn planning_evidence() -> PlanningEvidence {
    PlanningEvidence {
        coordinates: Some(location()),
        council: Some(CouncilStats {
            activity_level: Some(ActivityLevel::Moderate),
            new_homes_approved: 150,
            refusal_rate: 12.0,
        }),
        applications: vec![
            PlanningApplication {
                reference: "124/55012/HHO".to_string(),
                heading: "Single storey rear extension".to_string(),
                appealed: false,
            },
            PlanningApplication {
                reference: "124/55190/FUL".to_string(),
                heading: "New surface water drainage connection to watercourse".to_string(),
                appealed: false,
            },
        ],
    }
}

/// Zone 2 with an active alert: 45 + 10 + 4.
pub(super) fn flood_evidence() -> FloodEvidence {
    FloodEvidence {
        zone: FloodZone::Zone2,
        most_severe_warning: WarningSeverity::Alert,
    }
}

/// 55 * 0.7 + 45 * 0.3.
pub(super) fn certificate() -> EnergyCertificate {
    EnergyCertificate {
        construction_age_band: "England and Wales: 1930-1949".to_string(),
        property_type: "Semi-detached house".to_string(),
        energy_rating: Some(EnergyRating::D),
    }
}

/// (240 * 3.0 + 96 * 2.5 + 480 * 0.3) / 96.
pub(super) fn crime_evidence() -> CrimeEvidence {
    let mut counts = BTreeMap::new();
    counts.insert(CrimeCategory::Burglary, 240);
    counts.insert(CrimeCategory::CriminalDamageArson, 96);
    counts.insert(CrimeCategory::Other, 480);
    CrimeEvidence {
        period: "2024-10 to 2025-09".to_string(),
        counts,
    }
}

pub(super) fn policies() -> Vec<PolicyExcerpt> {
    vec![
        PolicyExcerpt {
            title: "Flood Risk Underwriting Guidelines".to_string(),
            section: "Section 2.1".to_string(),
            text: "Zone 2 properties are accepted with a loading of up to 40%.".to_string(),
        },
        PolicyExcerpt {
            title: "Property Age Guidelines".to_string(),
            section: "Section 3.2".to_string(),
            text: "Inter-war construction requires no survey below a score of 60.".to_string(),
        },
    ]
}

pub(super) const EXPECTED_FLOOD: f64 = 59.0;
pub(super) const EXPECTED_PROPERTY_AGE: f64 = 52.0;
pub(super) const EXPECTED_LOCALITY: f64 = 11.5;
/// Moderate activity with the construction component degraded to 0.
pub(super) const EXPECTED_PLANNING_FALLBACK: f64 = 15.0;

/// Data source returning one canned result, optionally after a delay.
pub(super) struct Scripted<T> {
    result: Result<T, SourceError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl<T: Clone + Send + Sync> Scripted<T> {
    pub(super) fn ok(value: T) -> Self {
        Self {
            result: Ok(value),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn failing(error: SourceError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<T, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

#[async_trait]
impl PlanningSource for Scripted<PlanningEvidence> {
    async fn survey(&self, _request: &AssessmentRequest) -> Result<PlanningEvidence, SourceError> {
        self.respond().await
    }
}

#[async_trait]
impl FloodSource for Scripted<FloodEvidence> {
    async fn flood_profile(&self, _location: Coordinates) -> Result<FloodEvidence, SourceError> {
        self.respond().await
    }
}

#[async_trait]
impl EnergyCertificateSource for Scripted<EnergyCertificate> {
    async fn certificate(
        &self,
        _request: &AssessmentRequest,
    ) -> Result<EnergyCertificate, SourceError> {
        self.respond().await
    }
}

#[async_trait]
impl CrimeSource for Scripted<CrimeEvidence> {
    async fn crimes(&self, _location: Coordinates) -> Result<CrimeEvidence, SourceError> {
        self.respond().await
    }
}

#[async_trait]
impl PolicySource for Scripted<Vec<PolicyExcerpt>> {
    async fn retrieve(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<PolicyExcerpt>, SourceError> {
        self.respond().await
    }
}

pub(super) struct SourceSet {
    pub planning: Arc<Scripted<PlanningEvidence>>,
    pub flood: Arc<Scripted<FloodEvidence>>,
    pub energy: Arc<Scripted<EnergyCertificate>>,
    pub crime: Arc<Scripted<CrimeEvidence>>,
    pub policies: Arc<Scripted<Vec<PolicyExcerpt>>>,
}

impl SourceSet {
    pub(super) fn healthy() -> Self {
        Self {
            planning: Arc::new(Scripted::ok(planning_evidence())),
            flood: Arc::new(Scripted::ok(flood_evidence())),
            energy: Arc::new(Scripted::ok(certificate())),
            crime: Arc::new(Scripted::ok(crime_evidence())),
            policies: Arc::new(Scripted::ok(policies())),
        }
    }

    pub(super) fn risk_sources(&self) -> RiskSources {
        RiskSources {
            planning: self.planning.clone(),
            flood: self.flood.clone(),
            energy: self.energy.clone(),
            crime: self.crime.clone(),
            policies: self.policies.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(super) enum Reply {
    Text(String),
    Fail(CapabilityError),
    Hang,
}

/// Capability answering each prompt purpose from a script. Unscripted purposes are unavailable.
#[derive(Debug, Default)]
pub(super) struct ScriptedCapability {
    replies: HashMap<PromptPurpose, Reply>,
    calls: Mutex<Vec<PromptPurpose>>,
}

impl ScriptedCapability {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn hanging() -> Self {
        Self::new()
            .with(PromptPurpose::ConstructionRisk, Reply::Hang)
            .with(PromptPurpose::DecisionSynthesis, Reply::Hang)
            .with(PromptPurpose::Explanation, Reply::Hang)
    }

    pub(super) fn with(mut self, purpose: PromptPurpose, reply: Reply) -> Self {
        self.replies.insert(purpose, reply);
        self
    }

    pub(super) fn replying(self, purpose: PromptPurpose, text: impl Into<String>) -> Self {
        self.with(purpose, Reply::Text(text.into()))
    }

    pub(super) fn calls(&self) -> Vec<PromptPurpose> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

#[async_trait]
impl GenerativeCapability for ScriptedCapability {
    async fn invoke(
        &self,
        prompt: &StructuredPrompt,
        _response_schema: &Value,
        _timeout: Duration,
    ) -> Result<String, CapabilityError> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(prompt.purpose);
        let reply = self
            .replies
            .get(&prompt.purpose)
            .cloned()
            .unwrap_or_else(|| Reply::Fail(CapabilityError::Unavailable("not scripted".to_string())));
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(error) => Err(error),
            Reply::Hang => {
                std::future::pending::<()>().await;
                Err(CapabilityError::Timeout)
            }
        }
    }
}

pub(super) fn construction_reply(severity: f64) -> String {
    json!({ "severity": severity, "reasoning": "Two minor nearby schemes." }).to_string()
}

pub(super) fn decision_reply(overall: f64, multiplier: f64, decision: &str) -> String {
    json!({
        "overall_risk_score": overall,
        "premium_multiplier": multiplier,
        "decision": decision,
        "underwriter_reasoning": "Zone 2 exposure dominates; other factors are moderate.",
    })
    .to_string()
}

pub(super) fn explanation_reply() -> String {
    let factor = |name: &str, score: f64, weight: f64| {
        json!({ "name": name, "score": score, "weight": weight, "reasoning": "Drawn from findings." })
    };
    json!({
        "risk_factors": [
            factor("Flood Risk", EXPECTED_FLOOD, 0.40),
            factor("Property Age Risk", EXPECTED_PROPERTY_AGE, 0.25),
            factor("Planning & Development Risk", 21.0, 0.20),
            factor("Locality & Crime Risk", EXPECTED_LOCALITY, 0.15),
        ],
        "policy_citations": ["Flood Risk Underwriting Guidelines – Section 2.1"],
        "plain_english_narrative": "Your home sits in flood zone 2 and has been referred for review.",
    })
    .to_string()
}

pub(super) fn test_config() -> PipelineConfig {
    PipelineConfig {
        run_deadline: Duration::from_secs(5),
        stage_timeout: Duration::from_secs(1),
        synthesis_timeout: Duration::from_millis(500),
        event_buffer: 8,
    }
}

pub(super) fn pipeline_with(
    sources: &SourceSet,
    capability: Arc<dyn GenerativeCapability>,
    config: PipelineConfig,
) -> UnderwritingPipeline {
    UnderwritingPipeline::new(
        sources.risk_sources(),
        capability,
        ScoringConfig::default(),
        config,
    )
}

pub(super) fn pipeline(
    sources: &SourceSet,
    capability: Arc<dyn GenerativeCapability>,
) -> UnderwritingPipeline {
    pipeline_with(sources, capability, test_config())
}

pub(super) async fn collect(mut events: EventStream) -> Vec<PipelineEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.next_event().await {
        collected.push(event);
    }
    collected
}

pub(super) fn terminal(events: &[PipelineEvent]) -> &PipelineEvent {
    events.last().expect("at least one event")
}

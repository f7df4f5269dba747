//! The five risk tasks. Each fetches evidence under the stage timeout and scores it.
//!
//! Recoverable source failures never surface as errors: the task substitutes the dimension's
//! neutral score and records a data warning. Only a fatal [`SourceError`] is returned.

use std::future::Future;
use std::time::Duration;

use super::domain::{
    AssessmentRequest, Coordinates, FloodZone, PolicyExcerpt, RiskDimension, RiskScore,
    RiskScores,
};
use super::scoring::ScoringEngine;
use super::sources::{
    flood_relevant_mentions, CrimeSource, EnergyCertificateSource, FloodSource, PlanningSource,
    PolicySource, SourceError,
};
use super::synthesis::{Synthesis, SynthesisAdapter};

pub(crate) const POLICY_LIMIT: usize = 3;

/// A task's value plus any data warnings raised while producing it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TaskOutput<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> TaskOutput<T> {
    fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    fn warned(value: T, warning: String) -> Self {
        Self {
            value,
            warnings: vec![warning],
        }
    }
}

/// Output of the first stage, shared read-only with the parallel group.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SiteSurvey {
    pub coordinates: Option<Coordinates>,
    pub flood_mentions: u32,
    pub planning: RiskScore,
}

async fn fetch<T, F>(timeout: Duration, fut: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Unavailable(format!(
            "timed out after {timeout:?}"
        ))),
    }
}

fn recoverable<T>(result: Result<T, SourceError>) -> Result<Result<T, SourceError>, SourceError> {
    match result {
        Err(err) if err.is_fatal() => Err(err),
        other => Ok(other),
    }
}

pub(crate) async fn survey_site(
    source: &dyn PlanningSource,
    synthesis: &SynthesisAdapter,
    engine: &ScoringEngine,
    request: &AssessmentRequest,
    timeout: Duration,
) -> Result<TaskOutput<SiteSurvey>, SourceError> {
    let neutral = |warning: String| {
        TaskOutput::warned(
            SiteSurvey {
                coordinates: None,
                flood_mentions: 0,
                planning: engine.neutral_planning(),
            },
            warning,
        )
    };

    let evidence = match recoverable(fetch(timeout, source.survey(request)).await)? {
        Ok(evidence) => evidence,
        Err(err) => {
            return Ok(neutral(format!(
                "Planning data source {err}; neutral planning score applied."
            )))
        }
    };

    if evidence.coordinates.is_none() {
        return Ok(neutral(format!(
            "Address '{}, {}' could not be geocoded; planning, flood and locality checks used \
             neutral scores.",
            request.address, request.postcode
        )));
    }

    let mut warnings = Vec::new();
    if evidence.council.is_none() {
        warnings.push("Council planning statistics unavailable; activity base of 0 used.".to_string());
    }

    let headings: Vec<String> = evidence
        .applications
        .iter()
        .map(|application| application.heading.clone())
        .filter(|heading| !heading.trim().is_empty())
        .collect();

    let construction_component = if headings.is_empty() {
        0.0
    } else {
        match synthesis.construction_risk(&headings).await {
            Synthesis::Ok(assessment) => assessment.severity,
            Synthesis::Degraded(reason) => {
                warnings.push(format!(
                    "Construction risk synthesis degraded ({reason}); component set to 0."
                ));
                0.0
            }
        }
    };

    let flood_mentions = flood_relevant_mentions(&evidence.applications);
    Ok(TaskOutput {
        value: SiteSurvey {
            coordinates: evidence.coordinates,
            flood_mentions,
            planning: engine.planning(&evidence, construction_component),
        },
        warnings,
    })
}

pub(crate) async fn assess_flood(
    source: &dyn FloodSource,
    engine: &ScoringEngine,
    survey: &SiteSurvey,
    timeout: Duration,
) -> Result<TaskOutput<RiskScore>, SourceError> {
    let Some(location) = survey.coordinates else {
        return Ok(TaskOutput::warned(
            engine.neutral_flood(survey.flood_mentions),
            "Flood risk not evaluated without coordinates; manual verification required."
                .to_string(),
        ));
    };

    match recoverable(fetch(timeout, source.flood_profile(location)).await)? {
        Ok(evidence) => {
            let score = engine.flood(&evidence, survey.flood_mentions);
            if evidence.zone == FloodZone::Unknown {
                Ok(TaskOutput::warned(
                    score,
                    "Flood zone could not be determined; manual verification required."
                        .to_string(),
                ))
            } else {
                Ok(TaskOutput::clean(score))
            }
        }
        Err(err) => Ok(TaskOutput::warned(
            engine.neutral_flood(survey.flood_mentions),
            format!("Flood data source {err}; neutral flood score applied."),
        )),
    }
}

pub(crate) async fn assess_property_age(
    source: &dyn EnergyCertificateSource,
    engine: &ScoringEngine,
    request: &AssessmentRequest,
    timeout: Duration,
) -> Result<TaskOutput<RiskScore>, SourceError> {
    match recoverable(fetch(timeout, source.certificate(request)).await)? {
        Ok(certificate) => Ok(TaskOutput::clean(engine.property_age(&certificate))),
        Err(err) => Ok(TaskOutput::warned(
            engine.neutral_property_age(),
            format!("Energy certificate source {err}; neutral property age score applied."),
        )),
    }
}

pub(crate) async fn assess_locality(
    source: &dyn CrimeSource,
    engine: &ScoringEngine,
    survey: &SiteSurvey,
    timeout: Duration,
) -> Result<TaskOutput<RiskScore>, SourceError> {
    let Some(location) = survey.coordinates else {
        return Ok(TaskOutput::warned(
            engine.neutral_locality(),
            "Crime data not fetched without coordinates; neutral locality score applied."
                .to_string(),
        ));
    };

    match recoverable(fetch(timeout, source.crimes(location)).await)? {
        Ok(evidence) if evidence.total() > 0 => Ok(TaskOutput::clean(engine.locality(&evidence))),
        Ok(_) => Ok(TaskOutput::warned(
            engine.neutral_locality(),
            format!(
                "Crime data source {}; neutral locality score applied.",
                SourceError::Empty
            ),
        )),
        Err(err) => Ok(TaskOutput::warned(
            engine.neutral_locality(),
            format!("Crime data source {err}; neutral locality score applied."),
        )),
    }
}

/// Descriptive retrieval query built from every dimension's score and label.
pub(crate) fn policy_query(scores: &RiskScores) -> String {
    let mut query = RiskDimension::EXPLANATION_ORDER
        .iter()
        .map(|dimension| {
            let score = scores.get(*dimension);
            format!(
                "{} {:.0} ({})",
                dimension.factor_name().to_ascii_lowercase(),
                score.value,
                score.label
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    query.push_str(", UK residential insurance policy");
    query
}

pub(crate) async fn retrieve_policies(
    source: &dyn PolicySource,
    scores: &RiskScores,
    timeout: Duration,
) -> Result<TaskOutput<Vec<PolicyExcerpt>>, SourceError> {
    let query = policy_query(scores);
    match recoverable(fetch(timeout, source.retrieve(&query, POLICY_LIMIT)).await)? {
        Ok(mut excerpts) if !excerpts.is_empty() => {
            excerpts.truncate(POLICY_LIMIT);
            Ok(TaskOutput::clean(excerpts))
        }
        Ok(_) => Ok(TaskOutput::warned(
            Vec::new(),
            format!("Policy retrieval {}; decision made without policy context.", SourceError::Empty),
        )),
        Err(err) => Ok(TaskOutput::warned(
            Vec::new(),
            format!("Policy retrieval {err}; decision made without policy context."),
        )),
    }
}

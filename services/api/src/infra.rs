use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use underwrite_ai::config::AppConfig;
use underwrite_ai::workflows::underwriting::domain::{
    ActivityLevel, AssessmentRequest, Coordinates, CrimeCategory, EnergyRating, FloodZone,
    PolicyExcerpt, WarningSeverity,
};
use underwrite_ai::workflows::underwriting::sources::{
    CouncilStats, CrimeEvidence, CrimeSource, EnergyCertificate, EnergyCertificateSource,
    FloodEvidence, FloodSource, PlanningApplication, PlanningEvidence, PlanningSource,
    PolicySource, SourceError,
};
use underwrite_ai::workflows::underwriting::{
    OfflineCapability, RiskSources, UnderwritingPipeline,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) pipeline: Arc<UnderwritingPipeline>,
}

/// Canned evidence for one postcode.
#[derive(Debug, Clone)]
struct PropertyFixture {
    planning: PlanningEvidence,
    flood: FloodEvidence,
    certificate: EnergyCertificate,
    crime: Vec<(CrimeCategory, u32)>,
}

/// Deterministic in-memory data sources keyed by normalised postcode.
#[derive(Debug, Clone)]
pub(crate) struct FixtureSources {
    properties: HashMap<String, PropertyFixture>,
    locations: Vec<(Coordinates, String)>,
    policies: Vec<PolicyExcerpt>,
}

fn postcode_key(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn application(reference: &str, heading: &str, appealed: bool) -> PlanningApplication {
    PlanningApplication {
        reference: reference.to_string(),
        heading: heading.to_string(),
        appealed,
    }
}

fn council(level: ActivityLevel, new_homes_approved: u32, refusal_rate: f64) -> CouncilStats {
    CouncilStats {
        activity_level: Some(level),
        new_homes_approved,
        refusal_rate,
    }
}

fn policy(title: &str, section: &str, text: &str) -> PolicyExcerpt {
    PolicyExcerpt {
        title: title.to_string(),
        section: section.to_string(),
        text: text.to_string(),
    }
}

impl FixtureSources {
    pub(crate) fn standard() -> Self {
        let fixtures = [
            (
                "M14 5TL",
                Coordinates {
                    latitude: 53.4509,
                    longitude: -2.2224,
                },
                PropertyFixture {
                    planning: PlanningEvidence {
                        coordinates: None,
                        council: Some(council(ActivityLevel::Moderate, 180, 14.0)),
                        applications: vec![application(
                            "124/55012/HHO",
                            "Single storey rear extension",
                            false,
                        )],
                    },
                    flood: FloodEvidence {
                        zone: FloodZone::Zone1,
                        most_severe_warning: WarningSeverity::None,
                    },
                    certificate: EnergyCertificate {
                        construction_age_band: "England and Wales: 1983-1990".to_string(),
                        property_type: "Semi-detached house".to_string(),
                        energy_rating: Some(EnergyRating::C),
                    },
                    crime: vec![
                        (CrimeCategory::Burglary, 60),
                        (CrimeCategory::VehicleCrime, 90),
                        (CrimeCategory::Other, 420),
                    ],
                },
            ),
            (
                "SW1A 2AA",
                Coordinates {
                    latitude: 51.5034,
                    longitude: -0.1276,
                },
                PropertyFixture {
                    planning: PlanningEvidence {
                        coordinates: None,
                        council: Some(council(ActivityLevel::High, 640, 25.0)),
                        applications: vec![
                            application("25/01144/FUL", "Basement excavation and drainage", true),
                            application("25/01990/LBC", "Flood defence gates to lower ground", false),
                            application("25/02011/FUL", "Replacement windows", false),
                        ],
                    },
                    flood: FloodEvidence {
                        zone: FloodZone::Zone3,
                        most_severe_warning: WarningSeverity::None,
                    },
                    certificate: EnergyCertificate {
                        construction_age_band: "England and Wales: before 1900".to_string(),
                        property_type: "Mid-terrace house".to_string(),
                        energy_rating: Some(EnergyRating::E),
                    },
                    crime: vec![
                        (CrimeCategory::Burglary, 400),
                        (CrimeCategory::VehicleCrime, 600),
                        (CrimeCategory::Other, 1_500),
                    ],
                },
            ),
            (
                "YO1 9HH",
                Coordinates {
                    latitude: 53.9590,
                    longitude: -1.0815,
                },
                PropertyFixture {
                    planning: PlanningEvidence {
                        coordinates: None,
                        council: Some(council(ActivityLevel::VeryHigh, 820, 31.0)),
                        applications: (0..5)
                            .map(|index| {
                                application(
                                    &format!("25/0{index}10/FUL"),
                                    &format!("Flood defence works phase {index}"),
                                    index < 4,
                                )
                            })
                            .collect(),
                    },
                    flood: FloodEvidence {
                        zone: FloodZone::Zone3,
                        most_severe_warning: WarningSeverity::Severe,
                    },
                    certificate: EnergyCertificate {
                        construction_age_band: "England and Wales: before 1900".to_string(),
                        property_type: "Mid-terrace house".to_string(),
                        energy_rating: Some(EnergyRating::G),
                    },
                    crime: vec![(CrimeCategory::Burglary, 2_000)],
                },
            ),
        ];

        let mut properties = HashMap::new();
        let mut locations = Vec::new();
        for (postcode, location, mut fixture) in fixtures {
            fixture.planning.coordinates = Some(location);
            properties.insert(postcode_key(postcode), fixture);
            locations.push((location, postcode_key(postcode)));
        }

        let policies = vec![
            policy(
                "Standard Home Policy v2",
                "Flood Zone 3 Decline Rule",
                "Properties located in flood zone 3 are declined for standard coverage unless \
                 substantial flood defences are confirmed in writing.",
            ),
            policy(
                "Standard Home Policy v2",
                "Flood Zone 2 Elevated Premium",
                "Properties in flood zone 2 are accepted with an elevated premium multiplier of 1.5x \
                 to 2.0x and a flood excess of £2,500.",
            ),
            policy(
                "Standard Home Policy v2",
                "Flood Zone 1 Standard Terms",
                "Properties in flood zone 1 qualify for standard flood coverage with no additional \
                 loading.",
            ),
            policy(
                "Standard Home Policy v2",
                "Pre-1900 Property Conditions",
                "Properties constructed before 1900 require a full structural survey. A minimum \
                 premium loading of 1.3x applies to property age risk.",
            ),
            policy(
                "Standard Home Policy v2",
                "High Development Density Conditions",
                "Areas with high or very high planning activity indicate nearby construction risk \
                 including subsidence and ground movement; apply a planning and development loading.",
            ),
            policy(
                "Standard Home Policy v2",
                "Refer to Underwriter Conditions",
                "Any property scoring 60-79 overall must be referred to a senior underwriter. \
                 Referral triggers include unavailable flood zone data and high locality crime risk.",
            ),
        ];

        Self {
            properties,
            locations,
            policies,
        }
    }

    fn property(&self, postcode: &str) -> Result<&PropertyFixture, SourceError> {
        self.properties
            .get(&postcode_key(postcode))
            .ok_or(SourceError::Empty)
    }

    fn located(&self, location: Coordinates) -> Result<&PropertyFixture, SourceError> {
        self.locations
            .iter()
            .find(|(known, _)| *known == location)
            .and_then(|(_, key)| self.properties.get(key))
            .ok_or(SourceError::Empty)
    }
}

#[async_trait]
impl PlanningSource for FixtureSources {
    async fn survey(&self, request: &AssessmentRequest) -> Result<PlanningEvidence, SourceError> {
        self.property(&request.postcode)
            .map(|fixture| fixture.planning.clone())
    }
}

#[async_trait]
impl FloodSource for FixtureSources {
    async fn flood_profile(&self, location: Coordinates) -> Result<FloodEvidence, SourceError> {
        self.located(location).map(|fixture| fixture.flood)
    }
}

#[async_trait]
impl EnergyCertificateSource for FixtureSources {
    async fn certificate(
        &self,
        request: &AssessmentRequest,
    ) -> Result<EnergyCertificate, SourceError> {
        self.property(&request.postcode)
            .map(|fixture| fixture.certificate.clone())
    }
}

#[async_trait]
impl CrimeSource for FixtureSources {
    async fn crimes(&self, location: Coordinates) -> Result<CrimeEvidence, SourceError> {
        let fixture = self.located(location)?;
        Ok(CrimeEvidence {
            period: "trailing 12 months".to_string(),
            counts: fixture.crime.iter().copied().collect::<BTreeMap<_, _>>(),
        })
    }
}

#[async_trait]
impl PolicySource for FixtureSources {
    /// Ranks the library by query-term overlap.
    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PolicyExcerpt>, SourceError> {
        let terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|term| term.len() > 3)
            .map(str::to_ascii_lowercase)
            .collect();

        let mut ranked: Vec<(usize, &PolicyExcerpt)> = self
            .policies
            .iter()
            .map(|policy| {
                let haystack = format!("{} {}", policy.section, policy.text).to_ascii_lowercase();
                let hits = terms.iter().filter(|term| haystack.contains(term.as_str())).count();
                (hits, policy)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        ranked.sort_by(|left, right| right.0.cmp(&left.0));

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(_, policy)| policy.clone())
            .collect())
    }
}

/// Pipeline wired to the fixture sources and an offline generative capability.
pub(crate) fn fixture_pipeline(config: &AppConfig) -> UnderwritingPipeline {
    let sources = Arc::new(FixtureSources::standard());
    UnderwritingPipeline::new(
        RiskSources {
            planning: sources.clone(),
            flood: sources.clone(),
            energy: sources.clone(),
            crime: sources.clone(),
            policies: sources,
        },
        Arc::new(OfflineCapability),
        config.scoring.clone(),
        config.pipeline.clone(),
    )
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    use underwrite_ai::config::{AppEnvironment, ServerConfig, TelemetryConfig};

    AppConfig {
        environment: AppEnvironment::Test,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        telemetry: TelemetryConfig {
            log_level: "warn".to_string(),
        },
        pipeline: Default::default(),
        scoring: Default::default(),
    }
}

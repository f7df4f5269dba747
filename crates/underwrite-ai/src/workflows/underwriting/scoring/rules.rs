//! Per-dimension scoring formulas. Every function here is pure.

use std::collections::BTreeMap;

use super::super::domain::{
    ActivityLevel, CrimeCategory, EnergyRating, FloodZone, WarningSeverity,
};

/// Upper bound of the generative construction-risk component.
pub const CONSTRUCTION_COMPONENT_MAX: f64 = 30.0;

const AGE_BAND_SCORES: [(&str, f64); 12] = [
    ("before 1900", 80.0),
    ("1900-1929", 65.0),
    ("1930-1949", 55.0),
    ("1950-1966", 45.0),
    ("1967-1975", 40.0),
    ("1976-1982", 35.0),
    ("1983-1990", 30.0),
    ("1991-1995", 25.0),
    ("1996-2002", 20.0),
    ("2003-2006", 15.0),
    ("2007-2011", 12.0),
    ("2012 onwards", 10.0),
];

const UNKNOWN_AGE_SCORE: f64 = 30.0;

pub(crate) fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Inputs to the planning formula.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanningInputs {
    pub activity_level: Option<ActivityLevel>,
    pub new_homes_approved: u32,
    pub refusal_rate: f64,
    pub construction_component: f64,
    pub appeals: u32,
}

pub fn activity_base(level: Option<ActivityLevel>) -> f64 {
    match level {
        Some(ActivityLevel::Low) => 5.0,
        Some(ActivityLevel::Moderate) => 15.0,
        Some(ActivityLevel::High) => 35.0,
        Some(ActivityLevel::VeryHigh) => 60.0,
        None => 0.0,
    }
}

pub fn stats_bonus(new_homes_approved: u32, refusal_rate: f64) -> f64 {
    let mut bonus = 0.0;
    if new_homes_approved > 500 {
        bonus += 8.0;
    } else if new_homes_approved > 200 {
        bonus += 4.0;
    }
    if refusal_rate > 20.0 {
        bonus += 4.0;
    }
    bonus
}

pub fn appeals_uplift(appeals: u32) -> f64 {
    f64::from(appeals.saturating_mul(3).min(12))
}

pub fn planning_score(inputs: &PlanningInputs) -> f64 {
    let construction = inputs
        .construction_component
        .clamp(0.0, CONSTRUCTION_COMPONENT_MAX);
    clamp_score(
        activity_base(inputs.activity_level)
            + stats_bonus(inputs.new_homes_approved, inputs.refusal_rate)
            + construction
            + appeals_uplift(inputs.appeals),
    )
}

pub fn flood_zone_base(zone: FloodZone) -> f64 {
    match zone {
        FloodZone::Zone1 => 5.0,
        FloodZone::Zone2 => 45.0,
        FloodZone::Zone3 => 85.0,
        FloodZone::Unknown => 20.0,
    }
}

pub fn warning_uplift(severity: WarningSeverity) -> f64 {
    match severity {
        WarningSeverity::None => 0.0,
        WarningSeverity::Alert => 10.0,
        WarningSeverity::Warning => 20.0,
        WarningSeverity::Severe => 30.0,
    }
}

/// Uplift for nearby planning applications that mention flood-relevant works.
pub fn planning_mention_uplift(mentions: u32) -> f64 {
    match mentions {
        0 => 0.0,
        1 => 4.0,
        2..=4 => 8.0,
        _ => 15.0,
    }
}

pub fn flood_score(zone: FloodZone, severity: WarningSeverity, mentions: u32) -> f64 {
    clamp_score(flood_zone_base(zone) + warning_uplift(severity) + planning_mention_uplift(mentions))
}

fn first_year(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    bytes
        .windows(4)
        .position(|window| window.iter().all(u8::is_ascii_digit))
        .and_then(|start| text.get(start..start + 4))
        .and_then(|digits| digits.parse().ok())
}

/// Construction-era score: pre-1900 highest, 2012 onwards lowest.
pub fn age_band_score(band: &str) -> f64 {
    let normalised = band.trim().to_ascii_lowercase();
    let normalised = normalised
        .strip_prefix("england and wales:")
        .unwrap_or(&normalised)
        .trim()
        .to_string();

    if normalised.is_empty() || normalised == "unknown" {
        return UNKNOWN_AGE_SCORE;
    }

    if let Some((_, score)) = AGE_BAND_SCORES.iter().find(|(key, _)| *key == normalised) {
        return *score;
    }

    if let Some((_, score)) = AGE_BAND_SCORES
        .iter()
        .find(|(key, _)| key.contains(normalised.as_str()))
    {
        return *score;
    }

    match first_year(&normalised) {
        Some(year) if year < 1900 => 80.0,
        Some(year) if year < 1930 => 65.0,
        Some(year) if year < 1950 => 55.0,
        Some(year) if year < 1967 => 45.0,
        Some(year) if year < 1976 => 40.0,
        Some(year) if year < 1983 => 35.0,
        Some(year) if year < 1991 => 30.0,
        Some(year) if year < 1996 => 25.0,
        Some(year) if year < 2003 => 20.0,
        Some(year) if year < 2007 => 15.0,
        Some(year) if year < 2012 => 12.0,
        Some(_) => 10.0,
        None => UNKNOWN_AGE_SCORE,
    }
}

pub fn energy_score(rating: EnergyRating) -> f64 {
    match rating {
        EnergyRating::A => 5.0,
        EnergyRating::B => 15.0,
        EnergyRating::C => 30.0,
        EnergyRating::D => 45.0,
        EnergyRating::E => 60.0,
        EnergyRating::F => 75.0,
        EnergyRating::G => 90.0,
    }
}

pub fn property_age_score(age_band: &str, rating: Option<EnergyRating>) -> f64 {
    let age = age_band_score(age_band);
    let combined = match rating {
        Some(rating) => age * 0.70 + energy_score(rating) * 0.30,
        None => age,
    };
    clamp_score(combined)
}

pub fn crime_weight(category: CrimeCategory) -> f64 {
    match category {
        CrimeCategory::Burglary => 3.0,
        CrimeCategory::CriminalDamageArson => 2.5,
        CrimeCategory::Robbery => 1.5,
        CrimeCategory::VehicleCrime => 1.0,
        CrimeCategory::TheftFromPerson => 0.8,
        CrimeCategory::Other => 0.3,
    }
}

pub fn locality_score(counts: &BTreeMap<CrimeCategory, u32>, normalisation: f64) -> f64 {
    if normalisation <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = counts
        .iter()
        .map(|(category, count)| f64::from(*count) * crime_weight(*category))
        .sum();
    (weighted / normalisation).min(100.0)
}

pub fn locality_label(score: f64) -> &'static str {
    match score {
        s if s < 20.0 => "Very Low Crime",
        s if s < 40.0 => "Low Crime",
        s if s < 60.0 => "Moderate Crime",
        s if s < 80.0 => "High Crime",
        _ => "Very High Crime",
    }
}

/// Generic severity band used where a dimension has no domain-specific label.
pub fn severity_label(score: f64) -> &'static str {
    match score {
        s if s < 20.0 => "Low",
        s if s < 50.0 => "Moderate",
        s if s < 75.0 => "High",
        _ => "Very High",
    }
}

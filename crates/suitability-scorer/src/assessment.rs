//! Suitability Assessment
//!
//! Advisory risk flags reported alongside a suitability score. Flags never
//! change the score itself.

use agro_core::{ClimateContext, CropRequirement, ForecastResult, SuitabilityScore, ToleranceTier};
use serde::{Deserialize, Serialize};

use crate::{validate, SuitabilityScorer};

/// Tiers at or above this tolerate a breach of the crop's range
const TOLERATED_TIER: ToleranceTier = ToleranceTier::Moderate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Frost,
    Heat,
    Drought,
}

impl RiskFlag {
    pub fn display_text(&self) -> &'static str {
        match self {
            RiskFlag::Frost => "Frost Risk",
            RiskFlag::Heat => "Heat Risk",
            RiskFlag::Drought => "Drought Risk",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskFlag::Frost => "Minimum temperature falls below what the crop tolerates",
            RiskFlag::Heat => "Maximum temperature exceeds what the crop tolerates",
            RiskFlag::Drought => "Rainfall falls short of the crop's minimum requirement",
        }
    }
}

/// Soil pH against the crop's acceptable range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhFit {
    TooAcidic,
    WithinRange,
    TooAlkaline,
    /// No sample, or the crop has no pH range
    Unknown,
}

impl PhFit {
    pub fn display_text(&self) -> &'static str {
        match self {
            PhFit::TooAcidic => "Too Acidic",
            PhFit::WithinRange => "Within Range",
            PhFit::TooAlkaline => "Too Alkaline",
            PhFit::Unknown => "Unknown",
        }
    }

    pub fn classify(ph: Option<f64>, min: Option<f64>, max: Option<f64>) -> Self {
        match (ph.filter(|p| p.is_finite()), min, max) {
            (Some(ph), Some(min), _) if ph < min => PhFit::TooAcidic,
            (Some(ph), _, Some(max)) if ph > max => PhFit::TooAlkaline,
            (Some(_), Some(_), Some(_)) => PhFit::WithinRange,
            _ => PhFit::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityAssessment {
    pub score: SuitabilityScore,
    pub risks: Vec<RiskFlag>,
    pub ph_fit: PhFit,
}

impl SuitabilityAssessment {
    pub fn has_risk(&self, flag: RiskFlag) -> bool {
        self.risks.contains(&flag)
    }
}

/// Score `crop` against `climate` and attach risk flags.
pub fn assess(
    crop: &CropRequirement,
    climate: &ClimateContext,
    soil_ph: Option<f64>,
) -> ForecastResult<SuitabilityAssessment> {
    assess_with(&SuitabilityScorer::default(), crop, climate, soil_ph)
}

pub fn assess_with(
    scorer: &SuitabilityScorer,
    crop: &CropRequirement,
    climate: &ClimateContext,
    soil_ph: Option<f64>,
) -> ForecastResult<SuitabilityAssessment> {
    let score = scorer.score(crop, climate)?;
    let inputs = validate(crop, climate)?;

    let mut risks = Vec::new();
    if inputs.context_temp.0 < inputs.crop_temp.0 && crop.frost_tolerance < TOLERATED_TIER {
        risks.push(RiskFlag::Frost);
    }
    if inputs.context_temp.1 > inputs.crop_temp.1 && crop.heat_tolerance < TOLERATED_TIER {
        risks.push(RiskFlag::Heat);
    }
    if inputs.context_precip < inputs.crop_precip.0 && crop.drought_tolerance < TOLERATED_TIER {
        risks.push(RiskFlag::Drought);
    }

    let ph_fit = PhFit::classify(soil_ph, crop.soil_ph_min, crop.soil_ph_max);

    if !risks.is_empty() {
        tracing::info!(
            "{} in {}: {} risk flag(s), pH {}",
            crop.crop_id,
            climate.id,
            risks.len(),
            ph_fit.display_text()
        );
    }

    Ok(SuitabilityAssessment {
        score,
        risks,
        ph_fit,
    })
}

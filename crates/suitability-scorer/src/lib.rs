//! Suitability Scorer
//!
//! Scores how well a crop's tolerated temperature and precipitation ranges
//! match a climate context, 0-100, as the sum of two 0-50 sub-scores.
//!
//! Temperature penalises only the gap between the minimum temperatures:
//! cold-tolerance breach is treated as the dominant risk. A missing input is
//! rejected rather than scored as zero.

pub mod assessment;

pub use assessment::{assess, PhFit, RiskFlag, SuitabilityAssessment};

use agro_core::{
    ClimateContext, CropRequirement, ForecastError, ForecastResult, SubScores, SuitabilityScore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRules {
    /// Ceiling of each sub-score
    pub max_sub_score: f64,
    /// Points lost per degree between context and crop minimum temperature
    pub temperature_penalty_per_degree: f64,
    /// Precipitation gap (mm) that still earns the full sub-score
    pub precipitation_tolerance_mm: f64,
    /// Millimetres beyond the tolerance that cost one point
    pub precipitation_mm_per_point: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            max_sub_score: 50.0,
            temperature_penalty_per_degree: 2.0,
            precipitation_tolerance_mm: 200.0,
            precipitation_mm_per_point: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuitabilityScorer {
    rules: ScoringRules,
}

/// Validated numeric inputs of one scoring call
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoringInputs {
    pub crop_temp: (f64, f64),
    pub context_temp: (f64, f64),
    pub crop_precip: (f64, f64),
    pub context_precip: f64,
}

impl SuitabilityScorer {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    pub fn score(&self, crop: &CropRequirement, climate: &ClimateContext) -> ForecastResult<SuitabilityScore> {
        self.score_at(crop, climate, Utc::now())
    }

    pub fn score_at(
        &self,
        crop: &CropRequirement,
        climate: &ClimateContext,
        computed_at: DateTime<Utc>,
    ) -> ForecastResult<SuitabilityScore> {
        let inputs = validate(crop, climate)?;

        let temperature = self.temperature_sub_score(inputs.crop_temp, inputs.context_temp);
        let precipitation = self.precipitation_sub_score(inputs.crop_precip, inputs.context_precip);

        let total = (temperature + precipitation).floor().clamp(0.0, 100.0);

        tracing::debug!(
            "Suitability {} vs {}: temperature={:.1} precipitation={:.1} total={}",
            crop.crop_id,
            climate.id,
            temperature,
            precipitation,
            total
        );

        Ok(SuitabilityScore {
            crop_id: crop.crop_id.clone(),
            climate_context_id: climate.id.clone(),
            score: total as u8,
            sub_scores: SubScores {
                temperature,
                precipitation,
            },
            computed_at,
        })
    }

    /// Full marks when the context range sits inside the crop range,
    /// otherwise a linear penalty on the minimum-temperature gap.
    pub fn temperature_sub_score(&self, crop: (f64, f64), context: (f64, f64)) -> f64 {
        let within = context.0 >= crop.0 && context.1 <= crop.1;
        if within {
            return self.rules.max_sub_score;
        }
        let gap = (context.0 - crop.0).abs();
        (self.rules.max_sub_score - self.rules.temperature_penalty_per_degree * gap).max(0.0)
    }

    /// The gap is the distance from the context precipitation to the crop's
    /// acceptable range (zero inside it). Gaps up to the tolerance earn full
    /// marks; beyond it, one point is lost per `precipitation_mm_per_point`.
    pub fn precipitation_sub_score(&self, crop: (f64, f64), context: f64) -> f64 {
        let gap = if context < crop.0 {
            crop.0 - context
        } else if context > crop.1 {
            context - crop.1
        } else {
            0.0
        };
        if gap <= self.rules.precipitation_tolerance_mm {
            return self.rules.max_sub_score;
        }
        let excess = gap - self.rules.precipitation_tolerance_mm;
        (self.rules.max_sub_score - excess / self.rules.precipitation_mm_per_point).max(0.0)
    }
}

fn required(value: Option<f64>, field: &str) -> ForecastResult<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(ForecastError::invalid(field, format!("{} is not a finite number", v))),
        None => Err(ForecastError::invalid(field, "value is missing")),
    }
}

fn ordered_range(min: f64, max: f64, field: &str) -> ForecastResult<(f64, f64)> {
    if min > max {
        return Err(ForecastError::invalid(
            field,
            format!("minimum {} exceeds maximum {}", min, max),
        ));
    }
    Ok((min, max))
}

pub(crate) fn validate(crop: &CropRequirement, climate: &ClimateContext) -> ForecastResult<ScoringInputs> {
    let crop_temp = ordered_range(
        required(crop.temperature_min, "crop.temperature_min")?,
        required(crop.temperature_max, "crop.temperature_max")?,
        "crop.temperature",
    )?;
    let context_temp = ordered_range(
        required(climate.temperature_min, "climate.temperature_min")?,
        required(climate.temperature_max, "climate.temperature_max")?,
        "climate.temperature",
    )?;
    let crop_precip = ordered_range(
        required(crop.precipitation_min, "crop.precipitation_min")?,
        required(crop.precipitation_max, "crop.precipitation_max")?,
        "crop.precipitation",
    )?;
    let context_precip = required(climate.annual_precipitation, "climate.annual_precipitation")?;
    if context_precip < 0.0 {
        return Err(ForecastError::invalid(
            "climate.annual_precipitation",
            "precipitation cannot be negative",
        ));
    }

    Ok(ScoringInputs {
        crop_temp,
        context_temp,
        crop_precip,
        context_precip,
    })
}

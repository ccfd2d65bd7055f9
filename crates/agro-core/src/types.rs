use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForecastError, ForecastResult};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque field key owned by the persistence layer
    FieldId
);
string_id!(
    /// Opaque crop key owned by the persistence layer
    CropId
);
string_id!(ClimateContextId);
string_id!(
    /// Market name used for price history lookups (e.g. "corn")
    Commodity
);

/// Probability mass an interval is built to cover, in (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceLevel(f64);

impl ConfidenceLevel {
    pub const P80: ConfidenceLevel = ConfidenceLevel(0.80);
    pub const P90: ConfidenceLevel = ConfidenceLevel(0.90);
    pub const P95: ConfidenceLevel = ConfidenceLevel(0.95);

    pub fn new(level: f64) -> ForecastResult<Self> {
        if level.is_finite() && level > 0.0 && level < 1.0 {
            Ok(Self(level))
        } else {
            Err(ForecastError::invalid(
                "confidence_level",
                format!("{} is outside (0, 1)", level),
            ))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Quantile of the lower interval bound
    pub fn lower_tail(self) -> f64 {
        (1.0 - self.0) / 2.0
    }

    /// Quantile of the upper interval bound
    pub fn upper_tail(self) -> f64 {
        (1.0 + self.0) / 2.0
    }
}

impl TryFrom<f64> for ConfidenceLevel {
    type Error = ForecastError;

    fn try_from(level: f64) -> Result<Self, Self::Error> {
        ConfidenceLevel::new(level)
    }
}

impl From<ConfidenceLevel> for f64 {
    fn from(level: ConfidenceLevel) -> f64 {
        level.0
    }
}

/// The date features are assembled at, and the date being forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForecastHorizon {
    pub as_of: NaiveDate,
    pub target: NaiveDate,
}

impl ForecastHorizon {
    pub fn new(as_of: NaiveDate, target: NaiveDate) -> ForecastResult<Self> {
        if target < as_of {
            return Err(ForecastError::invalid(
                "horizon",
                format!("target {} precedes as-of date {}", target, as_of),
            ));
        }
        Ok(Self { as_of, target })
    }

    pub fn from_today(target: NaiveDate) -> ForecastResult<Self> {
        Self::new(Utc::now().date_naive(), target)
    }

    pub fn season(&self) -> i32 {
        chrono::Datelike::year(&self.target)
    }
}

/// Ordinal tolerance tier: none < light < moderate < heavy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceTier {
    #[default]
    None,
    Light,
    Moderate,
    Heavy,
}

/// Climate observed or forecast for a location. Fields may be null upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateContext {
    pub id: ClimateContextId,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,
    /// Annual precipitation (mm)
    pub annual_precipitation: Option<f64>,
    #[serde(default)]
    pub growing_season_days: Option<u32>,
    #[serde(default)]
    pub frost_free_days: Option<u32>,
}

fn default_base_temperature() -> f64 {
    10.0
}

/// Agronomic requirements of a crop (reference data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRequirement {
    pub crop_id: CropId,
    pub commodity: Commodity,
    pub temperature_min: Option<f64>,
    pub temperature_max: Option<f64>,
    pub precipitation_min: Option<f64>,
    pub precipitation_max: Option<f64>,
    #[serde(default)]
    pub soil_ph_min: Option<f64>,
    #[serde(default)]
    pub soil_ph_max: Option<f64>,
    #[serde(default)]
    pub drought_tolerance: ToleranceTier,
    #[serde(default)]
    pub heat_tolerance: ToleranceTier,
    #[serde(default)]
    pub frost_tolerance: ToleranceTier,
    /// Base temperature for growing degree days (°C)
    #[serde(default = "default_base_temperature")]
    pub base_temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    /// 0-50
    pub temperature: f64,
    /// 0-50
    pub precipitation: f64,
}

/// Crop/climate compatibility. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityScore {
    pub crop_id: CropId,
    pub climate_context_id: ClimateContextId,
    /// 0-100
    pub score: u8,
    pub sub_scores: SubScores,
    pub computed_at: DateTime<Utc>,
}

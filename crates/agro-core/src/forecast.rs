//! Value objects produced by the forecasting components.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::ModelFailure;
use crate::features::Feature;
use crate::types::{Commodity, ConfidenceLevel, CropId, FieldId};

/// One ensemble member's share of a yield prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberContribution {
    pub model: String,
    /// Weight after renormalisation over the members that ran
    pub weight: f64,
    pub prediction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldForecast {
    pub field_id: FieldId,
    pub crop_id: CropId,
    pub horizon_date: NaiveDate,
    pub point_estimate: f64,
    pub interval_low: f64,
    pub interval_high: f64,
    pub confidence_level: ConfidenceLevel,
    pub model_version: String,
    /// True when at least one ensemble member could not run
    pub degraded: bool,
    pub members: Vec<MemberContribution>,
    #[serde(default)]
    pub dropped: Vec<ModelFailure>,
    /// Share of the prediction attributed to each feature; sums to 1 when present
    #[serde(default)]
    pub feature_importance: BTreeMap<Feature, f64>,
}

impl YieldForecast {
    pub fn interval_width(&self) -> f64 {
        self.interval_high - self.interval_low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub price: f64,
}

/// Exogenous market signal, e.g. stocks-to-use ratio or futures basis.
///
/// Shifts the price level by `elasticity` times the relative deviation of
/// `value` from `baseline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIndicator {
    pub name: String,
    pub value: f64,
    pub baseline: f64,
    pub elasticity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceForecast {
    pub commodity: Commodity,
    pub horizon_date: NaiveDate,
    pub point_estimate: f64,
    pub interval_low: f64,
    pub interval_high: f64,
    pub confidence_level: ConfidenceLevel,
}

impl PriceForecast {
    pub fn interval_width(&self) -> f64 {
        self.interval_high - self.interval_low
    }
}

/// Monthly forecast steps up to (and including) the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePath {
    pub commodity: Commodity,
    pub steps: Vec<PriceForecast>,
}

impl PricePath {
    /// The step at the requested horizon.
    pub fn terminal(&self) -> Option<&PriceForecast> {
        self.steps.last()
    }
}

/// A field operation planned for the season (seeding, spraying, harvest...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedOperation {
    pub name: String,
    /// Input category used for price lookup (e.g. "seed", "nitrogen")
    pub category: String,
    pub quantity: Decimal,
    /// Explicit price agreed for this operation, overrides assumptions
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputPriceAssumptions {
    /// Season-specific price per input category
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
    /// Fallback price per input category
    #[serde(default)]
    pub defaults: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Operation,
    Assumption,
    CategoryDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub operation: String,
    pub category: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub price_source: PriceSource,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total: Decimal,
    pub lines: Vec<CostLine>,
    pub by_category: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioTag {
    Optimistic,
    Expected,
    Pessimistic,
}

impl fmt::Display for ScenarioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioTag::Optimistic => write!(f, "optimistic"),
            ScenarioTag::Expected => write!(f, "expected"),
            ScenarioTag::Pessimistic => write!(f, "pessimistic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverFactor {
    Yield,
    Price,
    Cost,
}

/// Marginal contribution of one factor to a scenario's profit delta vs expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitDriver {
    pub factor: DriverFactor,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitabilityScenario {
    pub scenario: ScenarioTag,
    #[serde(rename = "yield")]
    pub yield_value: f64,
    pub price: f64,
    pub cost: f64,
    /// yield * price - cost
    pub net_profit: f64,
    /// Ranked by absolute contribution, largest first
    pub drivers: Vec<ProfitDriver>,
    pub key_driver: Option<DriverFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitabilityForecast {
    pub field_id: FieldId,
    pub crop_id: CropId,
    pub horizon_date: NaiveDate,
    pub optimistic: ProfitabilityScenario,
    pub expected: ProfitabilityScenario,
    pub pessimistic: ProfitabilityScenario,
    /// Set when the profit ordering pessimistic <= expected <= optimistic failed
    pub inconsistent: bool,
    pub degraded_yield: bool,
    pub cost_sensitivity: f64,
}

/// Regional distribution of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileDistribution {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkTier {
    BottomQuartile,
    BelowAverage,
    AboveAverage,
    TopQuartile,
}

impl BenchmarkTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkTier::BottomQuartile => "bottom_quartile",
            BenchmarkTier::BelowAverage => "below_average",
            BenchmarkTier::AboveAverage => "above_average",
            BenchmarkTier::TopQuartile => "top_quartile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub metric_name: String,
    pub farm_value: f64,
    pub percentile_25: f64,
    pub percentile_50: f64,
    pub percentile_75: f64,
    pub percentile_90: f64,
    pub tier: BenchmarkTier,
    /// Interpolated position of the farm value in the distribution (0-100)
    pub approximate_percentile: f64,
}

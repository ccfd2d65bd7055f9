//! In-memory collaborators backed by a JSON snapshot.
//!
//! Used by the `agro-forecast` binary and by engine tests. Range queries
//! filter by date the same way a store would; missing records are NotFound.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use agro_core::{
    BenchmarkSource, ClimateContext, ClimateContextId, Commodity, CropId, CropRequirement,
    FarmPlanSource, FieldHistorySource, FieldId, ForecastError, ForecastResult,
    InputPriceAssumptions, MarketDataSource, MarketIndicator, PercentileDistribution,
    PlannedOperation, PriceObservation, ReferenceData, SeasonYield, SoilSample, TrainingSample,
    VegetationObservation, WeatherObservation,
};

/// Observations recorded for one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRecord {
    #[serde(default)]
    pub weather: Vec<WeatherObservation>,
    #[serde(default)]
    pub soil: Vec<SoilSample>,
    #[serde(default)]
    pub vegetation: Vec<VegetationObservation>,
    /// Realized yields per crop grown on the field
    #[serde(default)]
    pub yields: HashMap<CropId, Vec<SeasonYield>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmPlan {
    pub field_id: FieldId,
    pub crop_id: CropId,
    pub season: i32,
    pub operations: Vec<PlannedOperation>,
    #[serde(default)]
    pub input_prices: InputPriceAssumptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalBenchmark {
    pub region: String,
    pub crop_type: String,
    pub metric: String,
    pub year: i32,
    pub distribution: PercentileDistribution,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub crops: Vec<CropRequirement>,
    #[serde(default)]
    pub climates: Vec<ClimateContext>,
    #[serde(default)]
    pub fields: HashMap<FieldId, FieldRecord>,
    #[serde(default)]
    pub training: HashMap<CropId, Vec<TrainingSample>>,
    #[serde(default)]
    pub prices: HashMap<Commodity, Vec<PriceObservation>>,
    #[serde(default)]
    pub indicators: HashMap<Commodity, Vec<MarketIndicator>>,
    #[serde(default)]
    pub plans: Vec<FarmPlan>,
    #[serde(default)]
    pub benchmarks: Vec<RegionalBenchmark>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySources {
    snapshot: Snapshot,
}

impl InMemorySources {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_json(raw: &str) -> ForecastResult<Self> {
        let snapshot: Snapshot = serde_json::from_str(raw)
            .map_err(|e| ForecastError::DataSource(format!("Failed to parse snapshot: {}", e)))?;
        tracing::info!(
            "Loaded snapshot: {} crops, {} climate contexts, {} fields, {} farm plans",
            snapshot.crops.len(),
            snapshot.climates.len(),
            snapshot.fields.len(),
            snapshot.plans.len()
        );
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn field(&self, field_id: &FieldId) -> ForecastResult<&FieldRecord> {
        self.snapshot
            .fields
            .get(field_id)
            .ok_or_else(|| ForecastError::not_found("field", field_id.as_str()))
    }
}

fn within(date: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    from <= date && date <= to
}

#[async_trait]
impl ReferenceData for InMemorySources {
    async fn crop_requirement(&self, crop_id: &CropId) -> ForecastResult<CropRequirement> {
        self.snapshot
            .crops
            .iter()
            .find(|c| &c.crop_id == crop_id)
            .cloned()
            .ok_or_else(|| ForecastError::not_found("crop", crop_id.as_str()))
    }

    async fn climate_context(&self, context_id: &ClimateContextId) -> ForecastResult<ClimateContext> {
        self.snapshot
            .climates
            .iter()
            .find(|c| &c.id == context_id)
            .cloned()
            .ok_or_else(|| ForecastError::not_found("climate context", context_id.as_str()))
    }
}

#[async_trait]
impl FieldHistorySource for InMemorySources {
    async fn weather(
        &self,
        field_id: &FieldId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ForecastResult<Vec<WeatherObservation>> {
        let mut observations: Vec<WeatherObservation> = self
            .field(field_id)?
            .weather
            .iter()
            .filter(|w| within(w.date, from, to))
            .cloned()
            .collect();
        observations.sort_by_key(|w| w.date);
        Ok(observations)
    }

    async fn soil_samples(&self, field_id: &FieldId, until: NaiveDate) -> ForecastResult<Vec<SoilSample>> {
        let mut samples: Vec<SoilSample> = self
            .field(field_id)?
            .soil
            .iter()
            .filter(|s| s.sampled_on <= until)
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.sampled_on);
        Ok(samples)
    }

    async fn vegetation(
        &self,
        field_id: &FieldId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ForecastResult<Vec<VegetationObservation>> {
        let mut observations: Vec<VegetationObservation> = self
            .field(field_id)?
            .vegetation
            .iter()
            .filter(|v| within(v.date, from, to))
            .cloned()
            .collect();
        observations.sort_by_key(|v| v.date);
        Ok(observations)
    }

    async fn yield_history(&self, field_id: &FieldId, crop_id: &CropId) -> ForecastResult<Vec<SeasonYield>> {
        let mut yields = self
            .field(field_id)?
            .yields
            .get(crop_id)
            .cloned()
            .unwrap_or_default();
        yields.sort_by_key(|y| y.season);
        Ok(yields)
    }

    async fn training_samples(&self, crop_id: &CropId) -> ForecastResult<Vec<TrainingSample>> {
        Ok(self.snapshot.training.get(crop_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataSource for InMemorySources {
    async fn price_history(&self, commodity: &Commodity, until: NaiveDate) -> ForecastResult<Vec<PriceObservation>> {
        let history = self
            .snapshot
            .prices
            .get(commodity)
            .ok_or_else(|| ForecastError::not_found("commodity", commodity.as_str()))?;
        let mut observations: Vec<PriceObservation> =
            history.iter().filter(|p| p.date <= until).cloned().collect();
        observations.sort_by_key(|p| p.date);
        Ok(observations)
    }

    async fn market_indicators(&self, commodity: &Commodity, _as_of: NaiveDate) -> ForecastResult<Vec<MarketIndicator>> {
        Ok(self.snapshot.indicators.get(commodity).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl FarmPlanSource for InMemorySources {
    async fn planned_operations(
        &self,
        field_id: &FieldId,
        crop_id: &CropId,
        season: i32,
    ) -> ForecastResult<Vec<PlannedOperation>> {
        self.snapshot
            .plans
            .iter()
            .find(|p| &p.field_id == field_id && &p.crop_id == crop_id && p.season == season)
            .map(|p| p.operations.clone())
            .ok_or_else(|| {
                ForecastError::not_found("farm plan", format!("{}/{}/{}", field_id, crop_id, season))
            })
    }

    async fn input_prices(&self, field_id: &FieldId, season: i32) -> ForecastResult<InputPriceAssumptions> {
        // Operations may still carry their own prices when no plan lists assumptions
        Ok(self
            .snapshot
            .plans
            .iter()
            .find(|p| &p.field_id == field_id && p.season == season)
            .map(|p| p.input_prices.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl BenchmarkSource for InMemorySources {
    async fn percentiles(
        &self,
        region: &str,
        crop_type: &str,
        metric: &str,
        year: Option<i32>,
    ) -> ForecastResult<PercentileDistribution> {
        self.snapshot
            .benchmarks
            .iter()
            .filter(|b| b.region == region && b.crop_type == crop_type && b.metric == metric)
            .filter(|b| year.map_or(true, |y| b.year == y))
            .max_by_key(|b| b.year)
            .map(|b| b.distribution.clone())
            .ok_or_else(|| {
                ForecastError::not_found("benchmark", format!("{}/{}/{}", region, crop_type, metric))
            })
    }
}

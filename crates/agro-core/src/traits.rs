use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    ClimateContext, ClimateContextId, Commodity, CropId, CropRequirement, FieldId,
    ForecastResult, InputPriceAssumptions, MarketIndicator, PercentileDistribution,
    PlannedOperation, PriceObservation, SeasonYield, SoilSample, TrainingSample,
    VegetationObservation, WeatherObservation,
};

/// Crop and climate reference records
#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn crop_requirement(&self, crop_id: &CropId) -> ForecastResult<CropRequirement>;
    async fn climate_context(&self, context_id: &ClimateContextId) -> ForecastResult<ClimateContext>;
}

/// Time-bounded field observations. Ranges are inclusive.
#[async_trait]
pub trait FieldHistorySource: Send + Sync {
    async fn weather(
        &self,
        field_id: &FieldId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ForecastResult<Vec<WeatherObservation>>;

    async fn soil_samples(&self, field_id: &FieldId, until: NaiveDate) -> ForecastResult<Vec<SoilSample>>;

    async fn vegetation(
        &self,
        field_id: &FieldId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ForecastResult<Vec<VegetationObservation>>;

    async fn yield_history(&self, field_id: &FieldId, crop_id: &CropId) -> ForecastResult<Vec<SeasonYield>>;

    /// Historical feature snapshots with realized yields, for fit-on-demand models
    async fn training_samples(&self, crop_id: &CropId) -> ForecastResult<Vec<TrainingSample>>;
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn price_history(&self, commodity: &Commodity, until: NaiveDate) -> ForecastResult<Vec<PriceObservation>>;
    async fn market_indicators(&self, commodity: &Commodity, as_of: NaiveDate) -> ForecastResult<Vec<MarketIndicator>>;
}

/// Planned operations and input-price assumptions per field and season
#[async_trait]
pub trait FarmPlanSource: Send + Sync {
    async fn planned_operations(
        &self,
        field_id: &FieldId,
        crop_id: &CropId,
        season: i32,
    ) -> ForecastResult<Vec<PlannedOperation>>;

    async fn input_prices(&self, field_id: &FieldId, season: i32) -> ForecastResult<InputPriceAssumptions>;
}

#[async_trait]
pub trait BenchmarkSource: Send + Sync {
    /// Latest available year when `year` is `None`
    async fn percentiles(
        &self,
        region: &str,
        crop_type: &str,
        metric: &str,
        year: Option<i32>,
    ) -> ForecastResult<PercentileDistribution>;
}

//! Forecast Engine
//!
//! Entry point for the persistence/API layer. Fetches inputs from the
//! collaborator traits and runs the forecasting components:
//! - Suitability scoring against reference data
//! - Yield inference on a blocking thread under a time budget
//! - Price, yield and cost computed concurrently, then composed into
//!   profitability scenarios
//! - Regional benchmark comparison
//! - Batch scheduling bounded by a semaphore

pub mod config;
pub mod fixtures;

pub use config::EngineConfig;
pub use fixtures::{InMemorySources, Snapshot};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agro_core::{
    BenchmarkResult, BenchmarkSource, ClimateContextId, Commodity, ConfidenceLevel, CostEstimate,
    CropId, CropRequirement, FarmPlanSource, FeatureVector, FieldHistory, FieldHistorySource,
    FieldId, ForecastError, ForecastHorizon, ForecastResult, MarketDataSource, ModelFailure,
    PriceForecast, PricePath, ProfitabilityForecast, ReferenceData, SuitabilityScore,
    TrainingSample, YieldForecast,
};
use chrono::NaiveDate;
use feature_assembler::FeatureAssembler;
use price_forecast::PriceForecastModel;
use profitability_engine::ProfitabilityEngine;
use suitability_scorer::{assessment::assess_with, SuitabilityAssessment, SuitabilityScorer};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use yield_forecast::YieldEnsemble;

/// Read-only collaborators the engine pulls its inputs from.
#[derive(Clone)]
pub struct DataSources {
    pub reference: Arc<dyn ReferenceData>,
    pub history: Arc<dyn FieldHistorySource>,
    pub market: Arc<dyn MarketDataSource>,
    pub plans: Arc<dyn FarmPlanSource>,
    pub benchmarks: Arc<dyn BenchmarkSource>,
}

impl DataSources {
    /// One source serving every collaborator role.
    pub fn shared<S>(source: Arc<S>) -> Self
    where
        S: ReferenceData + FieldHistorySource + MarketDataSource + FarmPlanSource + BenchmarkSource + 'static,
    {
        Self {
            reference: source.clone(),
            history: source.clone(),
            market: source.clone(),
            plans: source.clone(),
            benchmarks: source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreRequest {
    pub crop_id: CropId,
    pub climate_context_id: ClimateContextId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfitabilityRequest {
    pub field_id: FieldId,
    pub crop_id: CropId,
    pub horizon: ForecastHorizon,
}

/// Where yield inference gets its ensemble from.
enum YieldModelSource {
    Registered(Arc<YieldEnsemble>),
    FitOnDemand(Vec<TrainingSample>),
}

#[derive(Clone)]
pub struct ForecastEngine {
    sources: DataSources,
    config: EngineConfig,
    scorer: SuitabilityScorer,
    assembler: FeatureAssembler,
    price_model: PriceForecastModel,
    profitability: ProfitabilityEngine,
    ensembles: Arc<HashMap<CropId, Arc<YieldEnsemble>>>,
}

impl ForecastEngine {
    pub fn new(sources: DataSources, config: EngineConfig) -> ForecastResult<Self> {
        config.yield_model.validate()?;
        if config.max_concurrency == 0 {
            return Err(ForecastError::invalid("max_concurrency", "at least one request must be allowed in flight"));
        }
        if config.inference_timeout_ms == 0 {
            return Err(ForecastError::invalid("inference_timeout_ms", "budget must be positive"));
        }
        let profitability = ProfitabilityEngine::new(config.scenario.clone())?;

        Ok(Self {
            sources,
            scorer: SuitabilityScorer::default(),
            assembler: FeatureAssembler::new(config.assembler.clone()),
            price_model: PriceForecastModel::new(config.price_model.clone()),
            profitability,
            ensembles: Arc::new(HashMap::new()),
            config,
        })
    }

    /// Register a pre-fit ensemble for a crop. Crops without one are fitted
    /// on demand from the history source's training samples.
    pub fn with_ensemble(mut self, crop_id: CropId, ensemble: YieldEnsemble) -> Self {
        Arc::make_mut(&mut self.ensembles).insert(crop_id, Arc::new(ensemble));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn score(&self, crop_id: &CropId, climate_context_id: &ClimateContextId) -> ForecastResult<SuitabilityScore> {
        let (crop, climate) = tokio::join!(
            self.sources.reference.crop_requirement(crop_id),
            self.sources.reference.climate_context(climate_context_id),
        );
        let score = self.scorer.score(&crop?, &climate?)?;
        tracing::info!("Scored {} in {}: {}", crop_id, climate_context_id, score.score);
        Ok(score)
    }

    /// Score plus advisory frost/heat/drought flags and soil pH fit.
    pub async fn assess(
        &self,
        crop_id: &CropId,
        climate_context_id: &ClimateContextId,
        soil_ph: Option<f64>,
    ) -> ForecastResult<SuitabilityAssessment> {
        let (crop, climate) = tokio::join!(
            self.sources.reference.crop_requirement(crop_id),
            self.sources.reference.climate_context(climate_context_id),
        );
        assess_with(&self.scorer, &crop?, &climate?, soil_ph)
    }

    pub async fn assemble_features(
        &self,
        field_id: &FieldId,
        crop: &CropRequirement,
        as_of: NaiveDate,
    ) -> ForecastResult<FeatureVector> {
        let (from, to) = self.assembler.history_range(as_of)?;
        let history = &self.sources.history;
        let (weather, soil, vegetation, yields) = tokio::join!(
            history.weather(field_id, from, to),
            history.soil_samples(field_id, to),
            history.vegetation(field_id, from, to),
            history.yield_history(field_id, &crop.crop_id),
        );
        let history = FieldHistory {
            weather: weather?,
            soil: soil?,
            vegetation: vegetation?,
            yields: yields?,
        };
        self.assembler.assemble(field_id, crop, as_of, &history)
    }

    pub async fn forecast_yield(
        &self,
        field_id: &FieldId,
        crop_id: &CropId,
        horizon: ForecastHorizon,
        confidence: ConfidenceLevel,
    ) -> ForecastResult<YieldForecast> {
        let crop = self.sources.reference.crop_requirement(crop_id).await?;
        self.forecast_yield_for(field_id, &crop, horizon, confidence).await
    }

    async fn forecast_yield_for(
        &self,
        field_id: &FieldId,
        crop: &CropRequirement,
        horizon: ForecastHorizon,
        confidence: ConfidenceLevel,
    ) -> ForecastResult<YieldForecast> {
        let registered = self.ensembles.get(&crop.crop_id).cloned();
        let (features, model) = tokio::join!(
            self.assemble_features(field_id, crop, horizon.as_of),
            self.yield_model_source(&crop.crop_id, registered),
        );
        let (features, model) = (features?, model?);

        let yield_config = self.config.yield_model.clone();
        let target = horizon.target;
        let inference = tokio::task::spawn_blocking(move || {
            let ensemble = match model {
                YieldModelSource::Registered(ensemble) => ensemble,
                YieldModelSource::FitOnDemand(samples) => Arc::new(YieldEnsemble::fit(&samples, &yield_config)?),
            };
            ensemble.predict(&features, confidence, target)
        });

        let forecast = self.within_budget("yield inference", inference).await?;
        tracing::info!(
            "Yield {}/{} at {}: {:.2} [{:.2}, {:.2}]{}",
            forecast.field_id,
            forecast.crop_id,
            forecast.horizon_date,
            forecast.point_estimate,
            forecast.interval_low,
            forecast.interval_high,
            if forecast.degraded { " (degraded)" } else { "" }
        );
        Ok(forecast)
    }

    async fn yield_model_source(
        &self,
        crop_id: &CropId,
        registered: Option<Arc<YieldEnsemble>>,
    ) -> ForecastResult<YieldModelSource> {
        if let Some(ensemble) = registered {
            return Ok(YieldModelSource::Registered(ensemble));
        }
        let samples = self.sources.history.training_samples(crop_id).await?;
        if samples.is_empty() {
            return Err(ForecastError::insufficient(
                ["training_samples"],
                format!("no fitted model or training history for crop {}", crop_id),
            ));
        }
        Ok(YieldModelSource::FitOnDemand(samples))
    }

    /// Await a blocking inference task, abandoning it once the budget runs out.
    async fn within_budget<T>(&self, operation: &str, task: JoinHandle<ForecastResult<T>>) -> ForecastResult<T> {
        let budget_ms = self.config.inference_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(budget_ms), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("{} task failed: {}", operation, e);
                Err(ForecastError::ModelUnavailable {
                    failures: vec![ModelFailure {
                        model: operation.to_string(),
                        missing_features: Vec::new(),
                        reason: format!("inference task failed: {}", e),
                    }],
                })
            }
            Err(_) => {
                tracing::warn!("{} exceeded {} ms", operation, budget_ms);
                Err(ForecastError::ForecastTimeout {
                    operation: operation.to_string(),
                    budget_ms,
                })
            }
        }
    }

    pub async fn forecast_price(&self, commodity: &Commodity, horizon: ForecastHorizon) -> ForecastResult<PriceForecast> {
        self.forecast_price_at(commodity, horizon, self.config.price_confidence).await
    }

    async fn forecast_price_at(
        &self,
        commodity: &Commodity,
        horizon: ForecastHorizon,
        confidence: ConfidenceLevel,
    ) -> ForecastResult<PriceForecast> {
        let (history, indicators) = tokio::join!(
            self.sources.market.price_history(commodity, horizon.as_of),
            self.sources.market.market_indicators(commodity, horizon.as_of),
        );
        self.price_model
            .predict(commodity, &history?, &indicators?, horizon, confidence)
    }

    /// Every monthly step from the as-of date through the target.
    pub async fn forecast_price_path(&self, commodity: &Commodity, horizon: ForecastHorizon) -> ForecastResult<PricePath> {
        let (history, indicators) = tokio::join!(
            self.sources.market.price_history(commodity, horizon.as_of),
            self.sources.market.market_indicators(commodity, horizon.as_of),
        );
        self.price_model.predict_path(
            commodity,
            &history?,
            &indicators?,
            horizon,
            self.config.price_confidence,
        )
    }

    pub async fn estimate_cost(&self, field_id: &FieldId, crop_id: &CropId, season: i32) -> ForecastResult<CostEstimate> {
        let (operations, prices) = tokio::join!(
            self.sources.plans.planned_operations(field_id, crop_id, season),
            self.sources.plans.input_prices(field_id, season),
        );
        cost_estimator::estimate(&operations?, &prices?)
    }

    /// Yield, price and cost run concurrently, then compose into scenarios.
    pub async fn forecast_profitability(
        &self,
        field_id: &FieldId,
        crop_id: &CropId,
        horizon: ForecastHorizon,
    ) -> ForecastResult<ProfitabilityForecast> {
        let crop = self.sources.reference.crop_requirement(crop_id).await?;
        let confidence = self.config.scenario_confidence;

        let (yield_forecast, price_forecast, cost) = tokio::join!(
            self.forecast_yield_for(field_id, &crop, horizon, confidence),
            self.forecast_price_at(&crop.commodity, horizon, confidence),
            self.estimate_cost(field_id, crop_id, horizon.season()),
        );

        self.profitability
            .compose(&yield_forecast?, &price_forecast?, &cost?)
    }

    /// Compare against the latest available regional distribution.
    pub async fn benchmark(
        &self,
        farm_value: f64,
        region: &str,
        crop_type: &str,
        metric: &str,
    ) -> ForecastResult<BenchmarkResult> {
        self.benchmark_in_year(farm_value, region, crop_type, metric, None).await
    }

    pub async fn benchmark_in_year(
        &self,
        farm_value: f64,
        region: &str,
        crop_type: &str,
        metric: &str,
        year: Option<i32>,
    ) -> ForecastResult<BenchmarkResult> {
        let distribution = self
            .sources
            .benchmarks
            .percentiles(region, crop_type, metric, year)
            .await?;
        benchmark_comparator::compare(metric, farm_value, &distribution)
    }

    pub async fn score_batch(&self, requests: Vec<ScoreRequest>) -> Vec<(ScoreRequest, ForecastResult<SuitabilityScore>)> {
        self.run_batch("score", requests, |engine, request: ScoreRequest| async move {
            engine.score(&request.crop_id, &request.climate_context_id).await
        })
        .await
    }

    pub async fn forecast_profitability_batch(
        &self,
        requests: Vec<ProfitabilityRequest>,
    ) -> Vec<(ProfitabilityRequest, ForecastResult<ProfitabilityForecast>)> {
        self.run_batch("profitability", requests, |engine, request: ProfitabilityRequest| async move {
            engine
                .forecast_profitability(&request.field_id, &request.crop_id, request.horizon)
                .await
        })
        .await
    }

    /// Runs one task per request with at most `max_concurrency` in flight.
    /// Results come back in completion order. A task that panics or is
    /// cancelled still yields its request, paired with a `DataSource` error.
    async fn run_batch<R, T, F, Fut>(&self, label: &str, requests: Vec<R>, op: F) -> Vec<(R, ForecastResult<T>)>
    where
        R: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(ForecastEngine, R) -> Fut,
        Fut: Future<Output = ForecastResult<T>> + Send + 'static,
    {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, R> = HashMap::with_capacity(total);

        for request in requests {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("{} batch semaphore closed: {}", label, e);
                    break;
                }
            };
            let work = op(self.clone(), request.clone());
            let handle = tasks.spawn(async move {
                let result = work.await;
                drop(permit);
                result
            });
            pending.insert(handle.id(), request);
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => {
                    tracing::error!("{} batch task failed: {}", label, e);
                    let err = ForecastError::DataSource(format!("{} task did not complete: {}", label, e));
                    (e.id(), Err(err))
                }
            };
            match pending.remove(&id) {
                Some(request) => results.push((request, result)),
                None => tracing::warn!("{} batch: result for unknown task {}", label, id),
            }
        }

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!("{} batch finished: {} of {} succeeded", label, results.len() - failed, total);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_core::{
        BenchmarkTier, ClimateContext, ErrorKind, Feature, InputPriceAssumptions, PercentileDistribution,
        PlannedOperation, PriceObservation, SeasonYield, SoilSample, ToleranceTier, VegetationObservation,
        WeatherObservation,
    };
    use approx::assert_relative_eq;
    use chrono::Duration as Days;
    use crate::fixtures::{FarmPlan, FieldRecord, RegionalBenchmark};
    use rust_decimal_macros::dec;
    use yield_forecast::{EnsembleMember, ResidualCalibration, YieldRegressor};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn horizon() -> ForecastHorizon {
        ForecastHorizon::new(date(2024, 6, 30), date(2024, 9, 30)).unwrap()
    }

    fn corn() -> CropRequirement {
        CropRequirement {
            crop_id: CropId::new("corn"),
            commodity: Commodity::new("corn"),
            temperature_min: Some(10.0),
            temperature_max: Some(30.0),
            precipitation_min: Some(500.0),
            precipitation_max: Some(800.0),
            soil_ph_min: Some(5.8),
            soil_ph_max: Some(7.0),
            drought_tolerance: ToleranceTier::Light,
            heat_tolerance: ToleranceTier::Moderate,
            frost_tolerance: ToleranceTier::None,
            base_temperature: 10.0,
        }
    }

    fn iowa() -> ClimateContext {
        ClimateContext {
            id: ClimateContextId::new("iowa"),
            temperature_min: Some(8.0),
            temperature_max: Some(28.0),
            annual_precipitation: Some(650.0),
            growing_season_days: Some(160),
            frost_free_days: Some(150),
        }
    }

    /// Daily weather for the 150 days up to the as-of date.
    fn season_weather() -> Vec<WeatherObservation> {
        let end = date(2024, 6, 30);
        (0..150)
            .map(|i| WeatherObservation {
                date: end - Days::days(i),
                temperature_min: 10.0,
                temperature_max: 24.0,
                precipitation: if i % 3 == 0 { 6.0 } else { 0.0 },
            })
            .collect()
    }

    fn field_record(with_soil: bool) -> FieldRecord {
        let mut record = FieldRecord {
            weather: season_weather(),
            ..Default::default()
        };
        if with_soil {
            record.soil.push(SoilSample {
                sampled_on: date(2024, 3, 1),
                ph: Some(6.5),
                organic_matter: Some(3.1),
                nitrogen: Some(42.0),
                phosphorus: Some(25.0),
                potassium: Some(180.0),
            });
        }
        record.vegetation = (0..12)
            .map(|i| VegetationObservation {
                date: date(2024, 3, 1) + Days::days(i * 10),
                ndvi: 0.4 + 0.03 * i as f64,
                evi: None,
            })
            .collect();
        record.yields.insert(
            CropId::new("corn"),
            (2019..=2023)
                .map(|season| SeasonYield {
                    season,
                    observed: 9.5 + 0.2 * (season - 2019) as f64,
                })
                .collect(),
        );
        record
    }

    /// Four plots per season, 2008-2023, with a smooth response to the inputs.
    fn training_samples() -> Vec<TrainingSample> {
        let mut samples = Vec::new();
        for season in 2008..=2023 {
            for plot in 0..4 {
                let k = (season - 2008) as f64 + plot as f64 * 0.37;
                let gdd = 1100.0 + 200.0 * ((k * 1.7).sin() + 1.0);
                let precip = 350.0 + 100.0 * ((k * 0.9).cos() + 1.0);
                let nitrogen = 30.0 + 10.0 * plot as f64;
                let ndvi = 0.6 + 0.1 * (k * 1.3).sin();
                let prior = 9.0 + 0.05 * (season - 2008) as f64;
                let observed = 2.0 + 0.004 * gdd + 0.003 * precip + 0.03 * nitrogen + 2.0 * ndvi
                    + 0.3 * (k * 2.1).sin();
                let features = FeatureVector::empty(
                    FieldId::new(format!("plot-{}", plot)),
                    CropId::new("corn"),
                    date(season, 7, 1),
                )
                .with(Feature::Gdd, gdd)
                .with(Feature::CumulativePrecip, precip)
                .with(Feature::SoilN, nitrogen)
                .with(Feature::SoilP, 25.0)
                .with(Feature::SoilK, 180.0)
                .with(Feature::NdviMean, ndvi)
                .with(Feature::NdviTrend, 0.002)
                .with(Feature::PriorYield, prior)
                .with(Feature::YieldTrend, 0.05);
                samples.push(TrainingSample {
                    season,
                    features,
                    observed_yield: observed,
                });
            }
        }
        samples
    }

    fn price_history() -> Vec<PriceObservation> {
        (0..42)
            .map(|i| PriceObservation {
                date: date(2021 + i / 12, (i % 12) as u32 + 1, 15),
                price: 175.0 + 0.4 * i as f64 + 6.0 * (i as f64 * 0.8).sin(),
            })
            .collect()
    }

    fn plan(field: &str) -> FarmPlan {
        FarmPlan {
            field_id: FieldId::new(field),
            crop_id: CropId::new("corn"),
            season: 2024,
            operations: vec![
                PlannedOperation {
                    name: "seeding".to_string(),
                    category: "seed".to_string(),
                    quantity: dec!(1),
                    unit_price: Some(dec!(250)),
                },
                PlannedOperation {
                    name: "side-dress".to_string(),
                    category: "nitrogen".to_string(),
                    quantity: dec!(150),
                    unit_price: None,
                },
                PlannedOperation {
                    name: "harvest".to_string(),
                    category: "machinery".to_string(),
                    quantity: dec!(1),
                    unit_price: None,
                },
            ],
            input_prices: InputPriceAssumptions {
                prices: HashMap::from([("nitrogen".to_string(), dec!(1.2))]),
                defaults: HashMap::from([("machinery".to_string(), dec!(120))]),
            },
        }
    }

    fn snapshot() -> Snapshot {
        let mut fields = HashMap::new();
        fields.insert(FieldId::new("field-1"), field_record(true));
        fields.insert(FieldId::new("field-2"), field_record(false));
        fields.insert(
            FieldId::new("field-3"),
            FieldRecord {
                weather: season_weather().into_iter().skip(60).collect(),
                ..Default::default()
            },
        );

        Snapshot {
            crops: vec![corn()],
            climates: vec![iowa()],
            fields,
            training: HashMap::from([(CropId::new("corn"), training_samples())]),
            prices: HashMap::from([(Commodity::new("corn"), price_history())]),
            indicators: HashMap::new(),
            plans: vec![plan("field-1"), plan("field-2"), plan("field-3")],
            benchmarks: vec![RegionalBenchmark {
                region: "midwest".to_string(),
                crop_type: "corn".to_string(),
                metric: "yield".to_string(),
                year: 2023,
                distribution: PercentileDistribution {
                    p25: 8.9,
                    p50: 9.8,
                    p75: 10.6,
                    p90: 11.5,
                },
            }],
        }
    }

    fn engine_with(config: EngineConfig) -> ForecastEngine {
        let sources = Arc::new(InMemorySources::new(snapshot()));
        ForecastEngine::new(DataSources::shared(sources), config).unwrap()
    }

    fn engine() -> ForecastEngine {
        engine_with(EngineConfig::default())
    }

    #[derive(Debug)]
    struct Fixed {
        value: f64,
        delay: std::time::Duration,
    }

    impl YieldRegressor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn required_features(&self) -> &[Feature] {
            &[]
        }

        fn predict(&self, _features: &FeatureVector) -> Result<f64, ModelFailure> {
            std::thread::sleep(self.delay);
            Ok(self.value)
        }
    }

    fn fixed_ensemble(value: f64, delay: std::time::Duration) -> YieldEnsemble {
        let calibration = ResidualCalibration::new(&[-0.1, -0.05, 0.0, 0.04, 0.12]).unwrap();
        YieldEnsemble::new(
            vec![EnsembleMember::new(Arc::new(Fixed { value, delay }), 1.0)],
            calibration,
            "fixed-v1",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_score_uses_reference_data() {
        let score = engine()
            .score(&CropId::new("corn"), &ClimateContextId::new("iowa"))
            .await
            .unwrap();
        // 2 degree minimum-temperature gap, precipitation inside the range
        assert_eq!(score.score, 96);
        assert_relative_eq!(score.sub_scores.temperature, 46.0);
    }

    #[tokio::test]
    async fn test_assess_flags_frost_risk() {
        let assessment = engine()
            .assess(&CropId::new("corn"), &ClimateContextId::new("iowa"), Some(6.4))
            .await
            .unwrap();
        assert_eq!(assessment.score.score, 96);
        assert!(assessment.has_risk(suitability_scorer::RiskFlag::Frost));
        assert_eq!(assessment.ph_fit, suitability_scorer::PhFit::WithinRange);
    }

    #[tokio::test]
    async fn test_unknown_crop_is_not_found() {
        let err = engine()
            .score(&CropId::new("quinoa"), &ClimateContextId::new("iowa"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_yield_fit_on_demand() {
        let forecast = engine()
            .forecast_yield(&FieldId::new("field-1"), &CropId::new("corn"), horizon(), ConfidenceLevel::P90)
            .await
            .unwrap();
        assert!(!forecast.degraded);
        assert_eq!(forecast.members.len(), 2);
        assert_eq!(forecast.horizon_date, date(2024, 9, 30));
        assert!(forecast.point_estimate > 0.0);
        assert!(forecast.interval_low <= forecast.point_estimate);
        assert!(forecast.point_estimate <= forecast.interval_high);
    }

    #[tokio::test]
    async fn test_missing_soil_degrades_to_trend_member() {
        let forecast = engine()
            .forecast_yield(&FieldId::new("field-2"), &CropId::new("corn"), horizon(), ConfidenceLevel::P80)
            .await
            .unwrap();
        assert!(forecast.degraded);
        assert_eq!(forecast.members.len(), 1);
        assert_relative_eq!(forecast.members[0].weight, 1.0);
        assert!(forecast.dropped.iter().any(|f| f.model == yield_forecast::TREE_MODEL_NAME));
    }

    #[tokio::test]
    async fn test_sparse_weather_is_insufficient() {
        let err = engine()
            .forecast_yield(&FieldId::new("field-3"), &CropId::new("corn"), horizon(), ConfidenceLevel::P80)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert!(err.to_string().contains("weather"));
    }

    #[tokio::test]
    async fn test_registered_ensemble_skips_fitting() {
        let engine = engine().with_ensemble(
            CropId::new("corn"),
            fixed_ensemble(10.0, std::time::Duration::ZERO),
        );
        let forecast = engine
            .forecast_yield(&FieldId::new("field-1"), &CropId::new("corn"), horizon(), ConfidenceLevel::P80)
            .await
            .unwrap();
        assert_relative_eq!(forecast.point_estimate, 10.0);
        assert_eq!(forecast.model_version, "fixed-v1");
    }

    #[tokio::test]
    async fn test_slow_inference_times_out() {
        let config = EngineConfig {
            inference_timeout_ms: 20,
            ..Default::default()
        };
        let engine = engine_with(config).with_ensemble(
            CropId::new("corn"),
            fixed_ensemble(10.0, std::time::Duration::from_millis(300)),
        );
        let err = engine
            .forecast_yield(&FieldId::new("field-1"), &CropId::new("corn"), horizon(), ConfidenceLevel::P80)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ForecastTimeout);
        assert!(matches!(err, ForecastError::ForecastTimeout { budget_ms: 20, .. }));
    }

    #[tokio::test]
    async fn test_price_forecast_at_target() {
        let forecast = engine()
            .forecast_price(&Commodity::new("corn"), horizon())
            .await
            .unwrap();
        assert_eq!(forecast.horizon_date, date(2024, 9, 30));
        assert_eq!(forecast.confidence_level, ConfidenceLevel::P80);
        assert!(forecast.interval_low <= forecast.point_estimate);
        assert!(forecast.point_estimate <= forecast.interval_high);

        let path = engine()
            .forecast_price_path(&Commodity::new("corn"), horizon())
            .await
            .unwrap();
        assert_eq!(path.terminal(), Some(&forecast));
    }

    #[tokio::test]
    async fn test_cost_resolves_prices_in_order() {
        let cost = engine()
            .estimate_cost(&FieldId::new("field-1"), &CropId::new("corn"), 2024)
            .await
            .unwrap();
        assert_eq!(cost.total, dec!(550));
    }

    #[tokio::test]
    async fn test_profitability_fans_out_and_orders_scenarios() {
        let engine = engine().with_ensemble(
            CropId::new("corn"),
            fixed_ensemble(10.0, std::time::Duration::ZERO),
        );
        let forecast = engine
            .forecast_profitability(&FieldId::new("field-1"), &CropId::new("corn"), horizon())
            .await
            .unwrap();

        assert!(!forecast.inconsistent);
        assert!(!forecast.degraded_yield);
        assert!(forecast.pessimistic.net_profit <= forecast.expected.net_profit);
        assert!(forecast.expected.net_profit <= forecast.optimistic.net_profit);
        assert_relative_eq!(forecast.expected.yield_value, 10.0);
        assert_relative_eq!(forecast.expected.cost, 550.0);
        assert_relative_eq!(forecast.optimistic.cost, 495.0);
        assert_relative_eq!(forecast.pessimistic.cost, 605.0);

        let price = engine
            .forecast_price(&Commodity::new("corn"), horizon())
            .await
            .unwrap();
        assert_relative_eq!(forecast.expected.price, price.point_estimate);
    }

    #[tokio::test]
    async fn test_profitability_reports_degraded_yield() {
        let forecast = engine()
            .forecast_profitability(&FieldId::new("field-2"), &CropId::new("corn"), horizon())
            .await
            .unwrap();
        assert!(forecast.degraded_yield);
    }

    #[tokio::test]
    async fn test_profitability_surfaces_component_errors() {
        let later = ForecastHorizon::new(date(2025, 6, 30), date(2025, 9, 30)).unwrap();
        let err = engine()
            .forecast_profitability(&FieldId::new("field-1"), &CropId::new("corn"), later)
            .await
            .unwrap_err();
        // No weather in the trailing window of the later as-of date
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[tokio::test]
    async fn test_benchmark_uses_latest_distribution() {
        let result = engine().benchmark(10.6, "midwest", "corn", "yield").await.unwrap();
        assert_eq!(result.tier, BenchmarkTier::TopQuartile);
        assert_eq!(result.metric_name, "yield");

        let missing = engine().benchmark(10.6, "delta", "rice", "yield").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_score_batch_keys_results_by_request() {
        let engine = engine_with(EngineConfig {
            max_concurrency: 1,
            ..Default::default()
        });
        let requests = vec![
            ScoreRequest {
                crop_id: CropId::new("corn"),
                climate_context_id: ClimateContextId::new("iowa"),
            },
            ScoreRequest {
                crop_id: CropId::new("corn"),
                climate_context_id: ClimateContextId::new("atlantis"),
            },
            ScoreRequest {
                crop_id: CropId::new("wheat"),
                climate_context_id: ClimateContextId::new("iowa"),
            },
        ];
        let results = engine.score_batch(requests.clone()).await;
        assert_eq!(results.len(), 3);

        let by_request: HashMap<ScoreRequest, ForecastResult<SuitabilityScore>> = results.into_iter().collect();
        assert_eq!(by_request[&requests[0]].as_ref().unwrap().score, 96);
        assert!(by_request[&requests[1]].is_err());
        assert!(by_request[&requests[2]].is_err());
    }

    #[tokio::test]
    async fn test_profitability_batch_isolates_failures() {
        let engine = engine().with_ensemble(
            CropId::new("corn"),
            fixed_ensemble(10.0, std::time::Duration::ZERO),
        );
        let requests: Vec<ProfitabilityRequest> = ["field-1", "field-2", "field-3"]
            .iter()
            .map(|field| ProfitabilityRequest {
                field_id: FieldId::new(*field),
                crop_id: CropId::new("corn"),
                horizon: horizon(),
            })
            .collect();
        let results = engine.forecast_profitability_batch(requests).await;
        assert_eq!(results.len(), 3);

        for (request, result) in results {
            match request.field_id.as_str() {
                "field-3" => assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientData),
                _ => assert!(result.is_ok()),
            }
        }
    }

    #[tokio::test]
    async fn test_batch_reports_panicked_task_against_its_request() {
        let engine = engine_with(EngineConfig {
            max_concurrency: 2,
            ..Default::default()
        });
        let results = engine
            .run_batch("numbers", vec![1u32, 2, 3], |_, n| async move {
                if n == 2 {
                    panic!("task for {} blew up", n);
                }
                Ok::<u32, ForecastError>(n * 10)
            })
            .await;
        assert_eq!(results.len(), 3);

        let by_request: HashMap<u32, ForecastResult<u32>> = results.into_iter().collect();
        assert_eq!(*by_request[&1].as_ref().unwrap(), 10);
        assert_eq!(*by_request[&3].as_ref().unwrap(), 30);
        assert_eq!(by_request[&2].as_ref().unwrap_err().kind(), ErrorKind::DataSource);
    }

    #[tokio::test]
    async fn test_oversized_window_fails_without_panicking() {
        let mut config = EngineConfig::default();
        config.assembler.season_window_days = 1_000_000_000;
        let engine = engine_with(config).with_ensemble(
            CropId::new("corn"),
            fixed_ensemble(10.0, std::time::Duration::ZERO),
        );

        let err = engine
            .forecast_yield(&FieldId::new("field-1"), &CropId::new("corn"), horizon(), ConfidenceLevel::P80)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = engine
            .forecast_profitability(&FieldId::new("field-1"), &CropId::new("corn"), horizon())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let sources = Arc::new(InMemorySources::new(Snapshot::default()));
        let config = EngineConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(ForecastEngine::new(DataSources::shared(sources), config).is_err());
    }
}

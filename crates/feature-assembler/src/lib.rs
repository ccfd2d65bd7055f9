//! Feature Assembler
//!
//! Turns raw weather, soil, satellite and yield history into a fixed-shape
//! [`FeatureVector`] for one field/crop/date. Required inputs that cannot be
//! resolved fail with `InsufficientData`; optional inputs are left missing.
//! No imputation happens here.

pub mod vegetation;

pub use vegetation::{analyze_stress, VegetationStress};

use agro_core::stats::{holt_linear, mean};
use agro_core::{
    CropRequirement, Feature, FeatureVector, FieldHistory, FieldId, ForecastError,
    ForecastResult, SoilSample, WeatherObservation,
};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAssemblerConfig {
    /// Weather observations required inside the trailing window
    pub min_weather_observations: usize,
    pub weather_window_days: i64,
    /// Window for GDD, cumulative precipitation and mean temperature
    pub season_window_days: i64,
    /// Soil samples older than this are ignored
    pub soil_max_age_days: i64,
    pub yield_smoothing_alpha: f64,
    pub yield_smoothing_beta: f64,
}

impl Default for FeatureAssemblerConfig {
    fn default() -> Self {
        Self {
            min_weather_observations: 3,
            weather_window_days: 30,
            season_window_days: 150,
            soil_max_age_days: 730,
            yield_smoothing_alpha: 0.6,
            yield_smoothing_beta: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureAssembler {
    config: FeatureAssemblerConfig,
}

impl FeatureAssembler {
    pub fn new(config: FeatureAssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureAssemblerConfig {
        &self.config
    }

    /// Inclusive date range of observations the assembler looks at.
    pub fn history_range(&self, as_of: NaiveDate) -> ForecastResult<(NaiveDate, NaiveDate)> {
        let days = self
            .config
            .season_window_days
            .max(self.config.weather_window_days);
        Ok((days_before(as_of, days - 1, "season_window_days")?, as_of))
    }

    pub fn assemble(
        &self,
        field_id: &FieldId,
        crop: &CropRequirement,
        as_of: NaiveDate,
        history: &FieldHistory,
    ) -> ForecastResult<FeatureVector> {
        let mut fv = FeatureVector::empty(field_id.clone(), crop.crop_id.clone(), as_of);

        let weather: Vec<&WeatherObservation> = history
            .weather
            .iter()
            .filter(|w| w.date <= as_of && is_usable_weather(w))
            .collect();
        let skipped = history.weather.len() - weather.len();
        if skipped > 0 {
            tracing::debug!(
                "Field {}: ignored {} weather records (future-dated or malformed)",
                field_id,
                skipped
            );
        }

        let recent_cutoff = days_before(as_of, self.config.weather_window_days, "weather_window_days")?;
        let recent = weather.iter().filter(|w| w.date > recent_cutoff).count();
        if recent < self.config.min_weather_observations {
            return Err(ForecastError::insufficient(
                ["weather"],
                format!(
                    "{} weather observations in the trailing {} days; at least {} required",
                    recent, self.config.weather_window_days, self.config.min_weather_observations
                ),
            ));
        }

        let season_cutoff = days_before(as_of, self.config.season_window_days, "season_window_days")?;
        let season: Vec<&WeatherObservation> = weather
            .iter()
            .copied()
            .filter(|w| w.date > season_cutoff)
            .collect();
        let daily_means: Vec<f64> = season
            .iter()
            .map(|w| (w.temperature_min + w.temperature_max) / 2.0)
            .collect();
        let gdd: f64 = daily_means
            .iter()
            .map(|t| (t - crop.base_temperature).max(0.0))
            .sum();
        let precipitation: f64 = season.iter().map(|w| w.precipitation).sum();

        fv.set(Feature::Gdd, Some(gdd));
        fv.set(Feature::CumulativePrecip, Some(precipitation));
        fv.set(Feature::MeanTemp, mean(&daily_means));

        if let Some(sample) = self.latest_soil_sample(&history.soil, as_of)? {
            fv.set(Feature::SoilPh, sample.ph);
            fv.set(Feature::SoilOrganicMatter, sample.organic_matter);
            fv.set(Feature::SoilN, sample.nitrogen);
            fv.set(Feature::SoilP, sample.phosphorus);
            fv.set(Feature::SoilK, sample.potassium);
        }

        let canopy: Vec<_> = history
            .vegetation
            .iter()
            .filter(|v| v.date <= as_of && v.date > season_cutoff)
            .cloned()
            .collect();
        match analyze_stress(&canopy) {
            Ok(stress) => {
                fv.set(Feature::NdviMean, Some(stress.mean_ndvi));
                fv.set(Feature::NdviTrend, Some(stress.slope));
            }
            Err(e) => tracing::debug!("Field {}: NDVI features missing: {}", field_id, e),
        }

        self.set_yield_features(&mut fv, history, as_of);

        tracing::debug!(
            "Assembled features for field {} / crop {} as of {} ({} missing)",
            field_id,
            crop.crop_id,
            as_of,
            fv.missing().len()
        );

        Ok(fv)
    }

    fn latest_soil_sample<'a>(
        &self,
        samples: &'a [SoilSample],
        as_of: NaiveDate,
    ) -> ForecastResult<Option<&'a SoilSample>> {
        let oldest = days_before(as_of, self.config.soil_max_age_days, "soil_max_age_days")?;
        Ok(samples
            .iter()
            .filter(|s| s.sampled_on <= as_of && s.sampled_on >= oldest)
            .max_by_key(|s| s.sampled_on))
    }

    /// Prior yield is the smoothed level of earlier seasons; trend needs two or more.
    fn set_yield_features(&self, fv: &mut FeatureVector, history: &FieldHistory, as_of: NaiveDate) {
        let mut seasons: Vec<_> = history
            .yields
            .iter()
            .filter(|y| y.season < as_of.year() && y.observed.is_finite() && y.observed >= 0.0)
            .collect();
        seasons.sort_by_key(|y| y.season);
        let values: Vec<f64> = seasons.iter().map(|y| y.observed).collect();

        match values.len() {
            0 => {}
            1 => fv.set(Feature::PriorYield, Some(values[0])),
            _ => {
                if let Some(fit) = holt_linear(
                    &values,
                    self.config.yield_smoothing_alpha,
                    self.config.yield_smoothing_beta,
                    1.0,
                ) {
                    fv.set(Feature::PriorYield, Some(fit.level));
                    fv.set(Feature::YieldTrend, Some(fit.trend));
                }
            }
        }
    }
}

/// `as_of` minus `days`, or `InvalidInput` naming the window when the date overflows.
fn days_before(as_of: NaiveDate, days: i64, window: &str) -> ForecastResult<NaiveDate> {
    Duration::try_days(days)
        .and_then(|span| as_of.checked_sub_signed(span))
        .ok_or_else(|| {
            ForecastError::invalid(
                window,
                format!("{} days before {} is outside the supported calendar", days, as_of),
            )
        })
}

fn is_usable_weather(w: &WeatherObservation) -> bool {
    w.temperature_min.is_finite()
        && w.temperature_max.is_finite()
        && w.precipitation.is_finite()
        && w.precipitation >= 0.0
        && w.temperature_min <= w.temperature_max
}

//! Price Forecast Model
//!
//! Monthly commodity price paths with confidence bands:
//! - Damped Holt smoothing over the monthly mean price
//! - Exogenous market indicators scaling the level
//! - Band half-widths from empirical one-step errors, scaled by the square
//!   root of the horizon and a per-calendar-month volatility factor
//! - Band width never narrows as the horizon moves out

pub mod bands;
pub mod indicators;
pub mod series;

pub use bands::{MonotoneBand, VolatilityProfile};
pub use indicators::indicator_factor;
pub use series::{monthly_series, months_between, step_dates, MonthlyPrice};

use agro_core::stats::holt_linear;
use agro_core::{
    Commodity, ConfidenceLevel, ForecastError, ForecastHorizon, ForecastResult, MarketIndicator,
    PriceForecast, PriceObservation, PricePath,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceModelConfig {
    pub alpha: f64,
    pub beta: f64,
    pub damping: f64,
    /// Monthly observations required before forecasting
    pub min_observations: usize,
    pub indicator_bounds: (f64, f64),
    pub month_factor_bounds: (f64, f64),
    /// Smallest relative half-width either side of the point at h = 1
    pub min_half_width: f64,
}

impl Default for PriceModelConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.2,
            damping: 0.9,
            min_observations: 12,
            indicator_bounds: (0.5, 1.5),
            month_factor_bounds: (0.5, 2.0),
            min_half_width: 0.005,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceForecastModel {
    config: PriceModelConfig,
}

impl PriceForecastModel {
    pub fn new(config: PriceModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriceModelConfig {
        &self.config
    }

    /// Price at the horizon target date.
    pub fn predict(
        &self,
        commodity: &Commodity,
        history: &[PriceObservation],
        indicators: &[MarketIndicator],
        horizon: ForecastHorizon,
        confidence: ConfidenceLevel,
    ) -> ForecastResult<PriceForecast> {
        let path = self.predict_path(commodity, history, indicators, horizon, confidence)?;
        path.steps.last().cloned().ok_or_else(|| {
            ForecastError::insufficient(["price_history"], "forecast path has no steps")
        })
    }

    /// Monthly steps from the as-of date up to and including the target.
    pub fn predict_path(
        &self,
        commodity: &Commodity,
        history: &[PriceObservation],
        indicators: &[MarketIndicator],
        horizon: ForecastHorizon,
        confidence: ConfidenceLevel,
    ) -> ForecastResult<PricePath> {
        let series = monthly_series(history, horizon.as_of);
        if series.len() < self.config.min_observations {
            return Err(ForecastError::insufficient(
                ["price_history"],
                format!(
                    "{} monthly prices for {}; at least {} required",
                    series.len(),
                    commodity,
                    self.config.min_observations
                ),
            ));
        }

        let values: Vec<f64> = series.iter().map(|p| p.price).collect();
        let fit = holt_linear(&values, self.config.alpha, self.config.beta, self.config.damping)
            .ok_or_else(|| ForecastError::insufficient(["price_history"], "series too short to smooth"))?;

        let residuals: Vec<(u32, f64)> = fit
            .one_step
            .iter()
            .filter(|(_, forecast, _)| *forecast > 0.0)
            .map(|(i, forecast, actual)| (series[*i].month, actual / forecast - 1.0))
            .collect();
        let profile = VolatilityProfile::fit(
            &residuals,
            confidence,
            self.config.min_half_width,
            self.config.month_factor_bounds,
        );
        let level_factor = indicator_factor(indicators, self.config.indicator_bounds)?;

        // Months between the last observation and the as-of date are forecast too
        let last = series[series.len() - 1];
        let offset = months_between(
            (last.year, last.month),
            (horizon.as_of.year(), horizon.as_of.month()),
        )
        .max(0) as u32;

        let mut band = MonotoneBand::default();
        let steps: Vec<PriceForecast> = step_dates(horizon.as_of, horizon.target)
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                let h = offset + i as u32 + 1;
                let point = (fit.forecast(h as usize) * level_factor).max(0.0);
                let (below, above) = profile.half_widths(point, h, date.month());
                let (interval_low, interval_high) = band.next(point, below, above);
                PriceForecast {
                    commodity: commodity.clone(),
                    horizon_date: date,
                    point_estimate: point,
                    interval_low,
                    interval_high,
                    confidence_level: confidence,
                }
            })
            .collect();

        tracing::debug!(
            "Price path for {}: {} steps from {} monthly prices (indicator factor {:.3})",
            commodity,
            steps.len(),
            series.len(),
            level_factor
        );

        Ok(PricePath {
            commodity: commodity.clone(),
            steps,
        })
    }
}

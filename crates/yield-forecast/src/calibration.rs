//! Empirical residual calibration
//!
//! Intervals come from the distribution of backtested relative errors
//! (`actual / predicted - 1`) rather than a Gaussian, since yield misses are
//! right-skewed. Quantiles use the Harrell-Davis estimator, which is strictly
//! increasing in the probability, so a higher confidence always widens the band.

use agro_core::stats::{harrell_davis_quantile, sorted_finite};
use agro_core::{ConfidenceLevel, ForecastError, ForecastResult};
use serde::{Deserialize, Serialize};

pub const MIN_RESIDUALS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualCalibration {
    /// Relative residuals, ascending
    residuals: Vec<f64>,
}

impl ResidualCalibration {
    pub fn new(residuals: &[f64]) -> ForecastResult<Self> {
        let sorted = sorted_finite(residuals);
        if sorted.len() < MIN_RESIDUALS {
            return Err(ForecastError::insufficient(
                ["backtest_residuals"],
                format!(
                    "{} backtested residuals; at least {} required",
                    sorted.len(),
                    MIN_RESIDUALS
                ),
            ));
        }
        if sorted.first() == sorted.last() {
            return Err(ForecastError::insufficient(
                ["backtest_residuals"],
                "backtested residuals are all identical",
            ));
        }
        Ok(Self { residuals: sorted })
    }

    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    /// Relative offsets `(lower, upper)` with `lower <= 0 <= upper`.
    pub fn offsets(&self, confidence: ConfidenceLevel) -> (f64, f64) {
        let lower = harrell_davis_quantile(&self.residuals, confidence.lower_tail()).unwrap_or(0.0);
        let upper = harrell_davis_quantile(&self.residuals, confidence.upper_tail()).unwrap_or(0.0);
        (lower.min(0.0), upper.max(0.0))
    }

    /// `(low, high)` around a non-negative point estimate.
    pub fn interval(&self, point: f64, confidence: ConfidenceLevel) -> (f64, f64) {
        let (lower, upper) = self.offsets(confidence);
        let low = (point * (1.0 + lower)).max(0.0).min(point);
        let high = (point * (1.0 + upper)).max(point);
        (low, high)
    }
}

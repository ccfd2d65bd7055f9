//! Trend (sequence) model
//!
//! Continues the smoothed yield series one season ahead with a damped trend,
//! then nudges the result by how the current season's canopy is developing:
//!
//! `prediction = prior_yield + damping * yield_trend + coupling * ndvi_trend`
//!
//! `coupling` is fitted by least squares through the origin on the residuals
//! of the damped continuation. Missing trends are treated as flat.

use agro_core::{Feature, FeatureVector, ForecastError, ForecastResult, ModelFailure, TrainingSample};
use serde::{Deserialize, Serialize};

use crate::regressor::{non_finite, YieldRegressor};

pub const TREND_MODEL_NAME: &str = "damped_trend";

const REQUIRED: [Feature; 1] = [Feature::PriorYield];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendModelConfig {
    /// Share of the yield trend carried into the next season
    pub damping: f64,
    pub min_training_samples: usize,
}

impl Default for TrendModelConfig {
    fn default() -> Self {
        Self {
            damping: 0.8,
            min_training_samples: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    damping: f64,
    ndvi_coupling: f64,
}

impl TrendModel {
    pub fn new(damping: f64, ndvi_coupling: f64) -> Self {
        Self { damping, ndvi_coupling }
    }

    pub fn fit(samples: &[TrainingSample], config: &TrendModelConfig) -> ForecastResult<Self> {
        if !(0.0..=1.0).contains(&config.damping) {
            return Err(ForecastError::invalid("trend.damping", "must lie in [0, 1]"));
        }

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut usable = 0usize;

        for sample in samples {
            let Some(prior) = sample.features.get(Feature::PriorYield) else {
                continue;
            };
            if !sample.observed_yield.is_finite() {
                continue;
            }
            usable += 1;
            let trend = sample.features.get(Feature::YieldTrend).unwrap_or(0.0);
            let ndvi_trend = sample.features.get(Feature::NdviTrend).unwrap_or(0.0);
            let residual = sample.observed_yield - (prior + config.damping * trend);
            numerator += ndvi_trend * residual;
            denominator += ndvi_trend * ndvi_trend;
        }

        if usable < config.min_training_samples {
            return Err(ForecastError::insufficient(
                ["training_samples"],
                format!(
                    "{} samples with a prior yield for {}; at least {} required",
                    usable, TREND_MODEL_NAME, config.min_training_samples
                ),
            ));
        }

        let ndvi_coupling = if denominator > f64::EPSILON {
            numerator / denominator
        } else {
            0.0
        };

        tracing::debug!(
            "Fitted trend model on {} samples (coupling {:.3})",
            usable,
            ndvi_coupling
        );

        Ok(Self::new(config.damping, ndvi_coupling))
    }

    pub fn ndvi_coupling(&self) -> f64 {
        self.ndvi_coupling
    }
}

impl YieldRegressor for TrendModel {
    fn name(&self) -> &str {
        TREND_MODEL_NAME
    }

    fn required_features(&self) -> &[Feature] {
        &REQUIRED
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelFailure> {
        self.check_required(features)?;
        let prior = features.get(Feature::PriorYield).unwrap_or_default();
        let trend = features.get(Feature::YieldTrend).unwrap_or(0.0);
        let ndvi_trend = features.get(Feature::NdviTrend).unwrap_or(0.0);

        let prediction = prior + self.damping * trend + self.ndvi_coupling * ndvi_trend;
        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(non_finite(TREND_MODEL_NAME))
        }
    }

    /// Magnitude of each term of the continuation.
    fn feature_importance(&self, features: &FeatureVector) -> Vec<(Feature, f64)> {
        [
            (Feature::PriorYield, features.get(Feature::PriorYield)),
            (Feature::YieldTrend, features.get(Feature::YieldTrend).map(|t| self.damping * t)),
            (Feature::NdviTrend, features.get(Feature::NdviTrend).map(|t| self.ndvi_coupling * t)),
        ]
        .into_iter()
        .filter_map(|(feature, term)| term.map(|v| (feature, v.abs())))
        .filter(|(_, v)| v.is_finite() && *v > 0.0)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_core::{CropId, FieldId};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn vector(prior: f64, trend: f64, ndvi_trend: f64) -> FeatureVector {
        FeatureVector::empty(
            FieldId::new("field-1"),
            CropId::new("wheat"),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
        .with(Feature::PriorYield, prior)
        .with(Feature::YieldTrend, trend)
        .with(Feature::NdviTrend, ndvi_trend)
    }

    #[test]
    fn test_recovers_ndvi_coupling() {
        let samples: Vec<TrainingSample> = [-0.02, -0.01, 0.01, 0.02, 0.03]
            .iter()
            .enumerate()
            .map(|(i, ndvi)| TrainingSample {
                season: 2019 + i as i32,
                features: vector(6.0, 0.5, *ndvi),
                observed_yield: 6.0 + 0.8 * 0.5 + 40.0 * ndvi,
            })
            .collect();
        let model = TrendModel::fit(&samples, &TrendModelConfig::default()).unwrap();
        assert_relative_eq!(model.ndvi_coupling(), 40.0, epsilon = 1e-9);
        assert_relative_eq!(model.predict(&vector(7.0, 0.0, 0.01)).unwrap(), 7.4, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_trends_are_flat() {
        let model = TrendModel::new(0.8, 40.0);
        let features = FeatureVector::empty(
            FieldId::new("field-1"),
            CropId::new("wheat"),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
        .with(Feature::PriorYield, 5.5);
        assert_relative_eq!(model.predict(&features).unwrap(), 5.5);
    }

    #[test]
    fn test_importance_is_term_magnitude() {
        let model = TrendModel::new(0.8, 40.0);
        let importance = model.feature_importance(&vector(6.0, 0.5, -0.01));
        assert_eq!(importance.len(), 3);
        assert_eq!(importance[0].0, Feature::PriorYield);
        assert_relative_eq!(importance[0].1, 6.0);
        assert_relative_eq!(importance[1].1, 0.4, epsilon = 1e-12);
        assert_relative_eq!(importance[2].1, 0.4, epsilon = 1e-12);

        // A flat trend contributes nothing
        let flat = model.feature_importance(&vector(6.0, 0.0, 0.0));
        assert_eq!(flat, vec![(Feature::PriorYield, 6.0)]);
    }

    #[test]
    fn test_requires_prior_yield() {
        let model = TrendModel::new(0.8, 0.0);
        let mut features = vector(5.0, 0.1, 0.0);
        features.set(Feature::PriorYield, None);
        let failure = model.predict(&features).unwrap_err();
        assert_eq!(failure.missing_features, vec!["prior_yield".to_string()]);
    }

    #[test]
    fn test_fit_needs_prior_yield_samples() {
        let samples = vec![TrainingSample {
            season: 2020,
            features: vector(5.0, 0.0, 0.0),
            observed_yield: 5.0,
        }];
        assert!(TrendModel::fit(&samples, &TrendModelConfig::default()).is_err());
    }
}

//! Gradient-boosted regression stumps
//!
//! Least-squares boosting of depth-1 trees. Each round fits the single split
//! (feature, threshold) that best reduces the squared residual, then adds the
//! shrunken leaf means to the running prediction. Captures non-linear
//! soil/weather thresholds; does not extrapolate beyond the training range.

use agro_core::{Feature, FeatureVector, ForecastError, ForecastResult, ModelFailure, TrainingSample};
use serde::{Deserialize, Serialize};

use crate::regressor::{non_finite, YieldRegressor};

pub const TREE_MODEL_NAME: &str = "boosted_stumps";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsembleConfig {
    pub features: Vec<Feature>,
    pub rounds: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
    /// Complete samples needed before a fit is attempted
    pub min_training_samples: usize,
}

impl Default for TreeEnsembleConfig {
    fn default() -> Self {
        Self {
            features: vec![
                Feature::Gdd,
                Feature::CumulativePrecip,
                Feature::SoilN,
                Feature::SoilP,
                Feature::SoilK,
                Feature::NdviMean,
            ],
            rounds: 120,
            learning_rate: 0.1,
            min_samples_leaf: 2,
            min_training_samples: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature: Feature,
    pub threshold: f64,
    /// Added when `value <= threshold`
    pub left: f64,
    pub right: f64,
}

impl Stump {
    fn apply(&self, row: &[f64], column: usize) -> f64 {
        if row[column] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedStumps {
    features: Vec<Feature>,
    base: f64,
    stumps: Vec<Stump>,
    /// Shrunken split gain accumulated per column of `features`
    #[serde(default)]
    importance: Vec<f64>,
}

/// Best split of one column against the current residuals.
struct Split {
    column: usize,
    threshold: f64,
    left: f64,
    right: f64,
    gain: f64,
}

impl BoostedStumps {
    /// Fit on every sample that carries all configured features.
    pub fn fit(samples: &[TrainingSample], config: &TreeEnsembleConfig) -> ForecastResult<Self> {
        if config.features.is_empty() {
            return Err(ForecastError::invalid("tree.features", "no features configured"));
        }

        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut targets: Vec<f64> = Vec::new();
        for sample in samples {
            if !sample.observed_yield.is_finite() {
                continue;
            }
            let row: Option<Vec<f64>> = config.features.iter().map(|f| sample.features.get(*f)).collect();
            if let Some(row) = row {
                rows.push(row);
                targets.push(sample.observed_yield);
            }
        }

        if rows.len() < config.min_training_samples {
            return Err(ForecastError::insufficient(
                ["training_samples"],
                format!(
                    "{} complete samples for {}; at least {} required",
                    rows.len(),
                    TREE_MODEL_NAME,
                    config.min_training_samples
                ),
            ));
        }

        let base = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![base; targets.len()];
        let mut stumps = Vec::with_capacity(config.rounds);
        let mut importance = vec![0.0; config.features.len()];

        for _ in 0..config.rounds {
            let residuals: Vec<f64> = targets.iter().zip(&predictions).map(|(y, p)| y - p).collect();

            let best = (0..config.features.len())
                .filter_map(|column| best_split(&rows, &residuals, column, config.min_samples_leaf))
                .max_by(|a, b| a.gain.partial_cmp(&b.gain).unwrap_or(std::cmp::Ordering::Equal));

            let Some(split) = best else { break };
            if split.gain <= f64::EPSILON {
                break;
            }

            let stump = Stump {
                feature: config.features[split.column],
                threshold: split.threshold,
                left: split.left * config.learning_rate,
                right: split.right * config.learning_rate,
            };
            for (row, prediction) in rows.iter().zip(predictions.iter_mut()) {
                *prediction += stump.apply(row, split.column);
            }
            importance[split.column] += split.gain * config.learning_rate;
            stumps.push(stump);
        }

        tracing::debug!(
            "Fitted {} stumps on {} samples (base {:.3})",
            stumps.len(),
            rows.len(),
            base
        );

        Ok(Self {
            features: config.features.clone(),
            base,
            stumps,
            importance,
        })
    }

    pub fn stumps(&self) -> &[Stump] {
        &self.stumps
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    /// Split gain per feature over the whole fit; features never split on are omitted.
    pub fn split_gain(&self) -> Vec<(Feature, f64)> {
        self.features
            .iter()
            .copied()
            .zip(self.importance.iter().copied())
            .filter(|(_, gain)| gain.is_finite() && *gain > 0.0)
            .collect()
    }
}

fn best_split(rows: &[Vec<f64>], residuals: &[f64], column: usize, min_leaf: usize) -> Option<Split> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|a, b| {
        rows[*a][column]
            .partial_cmp(&rows[*b][column])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let n = order.len();
    let total: f64 = residuals.iter().sum();
    let mut left_sum = 0.0;
    let mut best: Option<Split> = None;

    for (i, idx) in order.iter().enumerate().take(n.saturating_sub(1)) {
        left_sum += residuals[*idx];
        let left_n = i + 1;
        let right_n = n - left_n;
        if left_n < min_leaf || right_n < min_leaf {
            continue;
        }
        let here = rows[*idx][column];
        let next = rows[order[i + 1]][column];
        if here == next {
            continue;
        }

        let left_mean = left_sum / left_n as f64;
        let right_mean = (total - left_sum) / right_n as f64;
        // Reduction in squared error relative to no split
        let gain = left_n as f64 * left_mean.powi(2) + right_n as f64 * right_mean.powi(2)
            - n as f64 * (total / n as f64).powi(2);

        if best.as_ref().map_or(true, |b| gain > b.gain) {
            best = Some(Split {
                column,
                threshold: (here + next) / 2.0,
                left: left_mean,
                right: right_mean,
                gain,
            });
        }
    }
    best
}

impl YieldRegressor for BoostedStumps {
    fn name(&self) -> &str {
        TREE_MODEL_NAME
    }

    fn required_features(&self) -> &[Feature] {
        &self.features
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelFailure> {
        self.check_required(features)?;
        let row: Vec<f64> = self
            .features
            .iter()
            .map(|f| features.get(*f).unwrap_or_default())
            .collect();

        let mut prediction = self.base;
        for stump in &self.stumps {
            let column = self
                .features
                .iter()
                .position(|f| *f == stump.feature)
                .unwrap_or_default();
            prediction += stump.apply(&row, column);
        }

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(non_finite(TREE_MODEL_NAME))
        }
    }

    fn feature_importance(&self, _features: &FeatureVector) -> Vec<(Feature, f64)> {
        self.split_gain()
    }
}

use agro_core::{Feature, FeatureVector, ModelFailure};
use std::fmt;

/// A fitted yield regressor that can sit in a [`crate::YieldEnsemble`].
pub trait YieldRegressor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Features that must be present for `predict` to run
    fn required_features(&self) -> &[Feature];

    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelFailure>;

    /// Non-negative weight of each feature behind the prediction for
    /// `features`. Scale is model-specific; the ensemble normalises it.
    fn feature_importance(&self, _features: &FeatureVector) -> Vec<(Feature, f64)> {
        Vec::new()
    }

    /// Fails with the missing feature names when a required feature is absent.
    fn check_required(&self, features: &FeatureVector) -> Result<(), ModelFailure> {
        let missing = features.missing_of(self.required_features());
        if missing.is_empty() {
            return Ok(());
        }
        Err(ModelFailure {
            model: self.name().to_string(),
            missing_features: missing.iter().map(|f| f.name().to_string()).collect(),
            reason: "required features missing".to_string(),
        })
    }
}

pub(crate) fn non_finite(model: &str) -> ModelFailure {
    ModelFailure {
        model: model.to_string(),
        missing_features: Vec::new(),
        reason: "non-finite prediction".to_string(),
    }
}

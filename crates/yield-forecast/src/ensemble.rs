//! Weighted yield ensemble with graceful degradation.
//!
//! Members are held in fallback priority order with fixed, pre-calibrated
//! weights. A member that cannot run on a feature vector is dropped and the
//! remaining weights are renormalised; the forecast is then flagged degraded.

use agro_core::{
    ConfidenceLevel, Feature, FeatureVector, ForecastError, ForecastResult, MemberContribution,
    ModelFailure, TrainingSample, YieldForecast,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backtest::walk_forward;
use crate::calibration::ResidualCalibration;
use crate::regressor::YieldRegressor;
use crate::tree_ensemble::{BoostedStumps, TreeEnsembleConfig, TREE_MODEL_NAME};
use crate::trend_model::{TrendModel, TrendModelConfig, TREND_MODEL_NAME};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldModelConfig {
    pub tree: TreeEnsembleConfig,
    pub trend: TrendModelConfig,
    pub tree_weight: f64,
    pub trend_weight: f64,
    /// Seasons of history before the first backtest fold
    pub min_train_seasons: usize,
    pub model_version: String,
}

impl Default for YieldModelConfig {
    fn default() -> Self {
        Self {
            tree: TreeEnsembleConfig::default(),
            trend: TrendModelConfig::default(),
            tree_weight: 0.6,
            trend_weight: 0.4,
            min_train_seasons: 3,
            model_version: "yield-ensemble-v1".to_string(),
        }
    }
}

impl YieldModelConfig {
    pub fn validate(&self) -> ForecastResult<()> {
        for (name, weight) in [("tree_weight", self.tree_weight), ("trend_weight", self.trend_weight)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ForecastError::invalid(name, format!("{} is not a non-negative weight", weight)));
            }
        }
        if self.tree_weight + self.trend_weight <= 0.0 {
            return Err(ForecastError::invalid("ensemble weights", "weights must sum to a positive total"));
        }
        if self.min_train_seasons == 0 {
            return Err(ForecastError::invalid("min_train_seasons", "at least one training season is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleMember {
    pub model: Arc<dyn YieldRegressor>,
    pub weight: f64,
}

impl EnsembleMember {
    pub fn new(model: Arc<dyn YieldRegressor>, weight: f64) -> Self {
        Self { model, weight }
    }
}

/// Point estimate from the members that could run.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub point: f64,
    pub contributions: Vec<MemberContribution>,
    pub dropped: Vec<ModelFailure>,
    /// Normalised over the members that ran
    pub feature_importance: BTreeMap<Feature, f64>,
}

impl Combination {
    pub fn degraded(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Weighted combination over runnable members. `unfitted` are members that
/// never fitted; they count as dropped for every prediction.
pub fn combine(
    members: &[EnsembleMember],
    unfitted: &[ModelFailure],
    features: &FeatureVector,
) -> ForecastResult<Combination> {
    let mut ran: Vec<(&EnsembleMember, f64)> = Vec::with_capacity(members.len());
    let mut dropped: Vec<ModelFailure> = unfitted.to_vec();

    for member in members {
        match member.model.predict(features) {
            Ok(prediction) => ran.push((member, prediction)),
            Err(failure) => dropped.push(failure),
        }
    }

    let total_weight: f64 = ran.iter().map(|(m, _)| m.weight).sum();
    if ran.is_empty() || total_weight <= 0.0 {
        return Err(ForecastError::ModelUnavailable { failures: dropped });
    }

    let contributions: Vec<MemberContribution> = ran
        .iter()
        .map(|(member, prediction)| MemberContribution {
            model: member.model.name().to_string(),
            weight: member.weight / total_weight,
            prediction: *prediction,
        })
        .collect();
    let point = contributions.iter().map(|c| c.weight * c.prediction).sum();
    let feature_importance = blend_importance(&ran, total_weight, features);

    Ok(Combination {
        point,
        contributions,
        dropped,
        feature_importance,
    })
}

/// Each member's importances are scaled to sum to its renormalised weight,
/// then the blend is scaled to sum to 1. Empty when no member reports any.
fn blend_importance(
    ran: &[(&EnsembleMember, f64)],
    total_weight: f64,
    features: &FeatureVector,
) -> BTreeMap<Feature, f64> {
    let mut blended: BTreeMap<Feature, f64> = BTreeMap::new();
    for (member, _) in ran {
        let scores: Vec<(Feature, f64)> = member
            .model
            .feature_importance(features)
            .into_iter()
            .filter(|(_, s)| s.is_finite() && *s > 0.0)
            .collect();
        let member_total: f64 = scores.iter().map(|(_, s)| s).sum();
        if member_total <= 0.0 {
            continue;
        }
        let share = member.weight / total_weight;
        for (feature, score) in scores {
            *blended.entry(feature).or_insert(0.0) += share * score / member_total;
        }
    }

    let total: f64 = blended.values().sum();
    if total > 0.0 {
        blended.values_mut().for_each(|v| *v /= total);
    }
    blended
}

/// Fit every member with a positive weight, in fallback priority order.
pub fn fit_members(
    samples: &[TrainingSample],
    config: &YieldModelConfig,
) -> ForecastResult<(Vec<EnsembleMember>, Vec<ModelFailure>)> {
    let mut members = Vec::new();
    let mut unfitted = Vec::new();

    if config.tree_weight > 0.0 {
        match BoostedStumps::fit(samples, &config.tree) {
            Ok(model) => members.push(EnsembleMember::new(Arc::new(model), config.tree_weight)),
            Err(err) => unfitted.push(fit_failure(TREE_MODEL_NAME, err)),
        }
    }
    if config.trend_weight > 0.0 {
        match TrendModel::fit(samples, &config.trend) {
            Ok(model) => members.push(EnsembleMember::new(Arc::new(model), config.trend_weight)),
            Err(err) => unfitted.push(fit_failure(TREND_MODEL_NAME, err)),
        }
    }

    if members.is_empty() {
        return Err(ForecastError::ModelUnavailable { failures: unfitted });
    }
    Ok((members, unfitted))
}

fn fit_failure(model: &str, err: ForecastError) -> ModelFailure {
    ModelFailure {
        model: model.to_string(),
        missing_features: Vec::new(),
        reason: format!("not fitted: {}", err),
    }
}

/// A calibrated, immutable yield ensemble.
#[derive(Debug, Clone)]
pub struct YieldEnsemble {
    members: Vec<EnsembleMember>,
    unfitted: Vec<ModelFailure>,
    calibration: ResidualCalibration,
    model_version: String,
}

impl YieldEnsemble {
    /// Assemble a pre-fit ensemble.
    pub fn new(
        members: Vec<EnsembleMember>,
        calibration: ResidualCalibration,
        model_version: impl Into<String>,
    ) -> ForecastResult<Self> {
        if members.is_empty() {
            return Err(ForecastError::invalid("members", "an ensemble needs at least one member"));
        }
        if let Some(bad) = members.iter().find(|m| !(m.weight.is_finite() && m.weight > 0.0)) {
            return Err(ForecastError::invalid(
                "members",
                format!("{} has non-positive weight {}", bad.model.name(), bad.weight),
            ));
        }
        Ok(Self {
            members,
            unfitted: Vec::new(),
            calibration,
            model_version: model_version.into(),
        })
    }

    /// Fit members on `samples` and calibrate them with a walk-forward backtest.
    pub fn fit(samples: &[TrainingSample], config: &YieldModelConfig) -> ForecastResult<Self> {
        config.validate()?;

        let residuals = walk_forward(samples, config);
        let calibration = ResidualCalibration::new(&residuals)?;
        let (members, unfitted) = fit_members(samples, config)?;

        for failure in &unfitted {
            tracing::warn!("Ensemble member unavailable: {}", failure);
        }
        tracing::info!(
            "Fitted yield ensemble {} on {} samples ({} members, {} backtest residuals)",
            config.model_version,
            samples.len(),
            members.len(),
            calibration.len()
        );

        Ok(Self {
            members,
            unfitted,
            calibration,
            model_version: config.model_version.clone(),
        })
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    pub fn calibration(&self) -> &ResidualCalibration {
        &self.calibration
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn predict(
        &self,
        features: &FeatureVector,
        confidence: ConfidenceLevel,
        horizon_date: NaiveDate,
    ) -> ForecastResult<YieldForecast> {
        let combination = combine(&self.members, &self.unfitted, features)?;
        // Intervals scale with the point, so a non-positive point has no usable band
        if !(combination.point.is_finite() && combination.point > 0.0) {
            let mut failures = combination.dropped;
            failures.push(ModelFailure {
                model: self.model_version.clone(),
                missing_features: Vec::new(),
                reason: format!("non-positive yield prediction {:.4}", combination.point),
            });
            return Err(ForecastError::ModelUnavailable { failures });
        }
        let point = combination.point;
        let (interval_low, interval_high) = self.calibration.interval(point, confidence);

        let degraded = combination.degraded();
        if degraded {
            tracing::warn!(
                "Degraded yield forecast for {}/{}: dropped {}",
                features.field_id,
                features.crop_id,
                combination
                    .dropped
                    .iter()
                    .map(|f| f.model.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(YieldForecast {
            field_id: features.field_id.clone(),
            crop_id: features.crop_id.clone(),
            horizon_date,
            point_estimate: point,
            interval_low,
            interval_high,
            confidence_level: confidence,
            model_version: self.model_version.clone(),
            degraded,
            members: combination.contributions,
            dropped: combination.dropped,
            feature_importance: combination.feature_importance,
        })
    }
}

//! Walk-forward backtest producing the residuals intervals are calibrated on.
//!
//! Each fold trains on every season strictly before the test season and
//! predicts that season's samples, so no fold sees its own future.

use agro_core::TrainingSample;
use rayon::prelude::*;

use crate::ensemble::{combine, fit_members, YieldModelConfig};

/// Predictions below this are too close to zero for a relative residual
const MIN_PREDICTION: f64 = 1e-6;

/// Relative residuals `actual / predicted - 1`, in season order.
///
/// Folds that cannot fit any member are skipped.
pub fn walk_forward(samples: &[TrainingSample], config: &YieldModelConfig) -> Vec<f64> {
    let mut seasons: Vec<i32> = samples.iter().map(|s| s.season).collect();
    seasons.sort_unstable();
    seasons.dedup();

    if seasons.len() <= config.min_train_seasons {
        tracing::debug!(
            "{} seasons available; walk-forward needs more than {}",
            seasons.len(),
            config.min_train_seasons
        );
        return Vec::new();
    }

    // Folds are independent, fit them in parallel
    let folds: Vec<Vec<f64>> = seasons[config.min_train_seasons..]
        .par_iter()
        .map(|&test_season| fold_residuals(samples, test_season, config))
        .collect();

    let residuals: Vec<f64> = folds.into_iter().flatten().collect();
    tracing::debug!(
        "Walk-forward over {} test seasons produced {} residuals",
        seasons.len() - config.min_train_seasons,
        residuals.len()
    );
    residuals
}

fn fold_residuals(samples: &[TrainingSample], test_season: i32, config: &YieldModelConfig) -> Vec<f64> {
    let train: Vec<TrainingSample> = samples
        .iter()
        .filter(|s| s.season < test_season)
        .cloned()
        .collect();

    let Ok((members, unfitted)) = fit_members(&train, config) else {
        return Vec::new();
    };

    samples
        .iter()
        .filter(|s| s.season == test_season && s.observed_yield.is_finite())
        .filter_map(|s| {
            let combination = combine(&members, &unfitted, &s.features).ok()?;
            (combination.point > MIN_PREDICTION).then(|| s.observed_yield / combination.point - 1.0)
        })
        .collect()
}

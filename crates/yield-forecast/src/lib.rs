//! Yield Forecast Model
//!
//! Ensemble yield regressor with calibrated intervals:
//! - Boosted regression stumps for non-linear soil/weather interactions
//! - Damped trend model continuing the field's yield history
//! - Fixed-weight combination with fallback when a member cannot run
//! - Intervals from walk-forward backtest residuals

pub mod backtest;
pub mod calibration;
pub mod ensemble;
pub mod regressor;
pub mod tree_ensemble;
pub mod trend_model;

pub use backtest::walk_forward;
pub use calibration::ResidualCalibration;
pub use ensemble::{combine, Combination, EnsembleMember, YieldEnsemble, YieldModelConfig};
pub use regressor::YieldRegressor;
pub use tree_ensemble::{BoostedStumps, TreeEnsembleConfig, TREE_MODEL_NAME};
pub use trend_model::{TrendModel, TrendModelConfig, TREND_MODEL_NAME};

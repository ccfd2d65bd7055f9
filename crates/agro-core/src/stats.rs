//! Pure statistical helpers shared by the forecasting crates.
//! Stateless functions with no I/O.

use statrs::distribution::{Beta, ContinuousCDF};
use statrs::statistics::Statistics;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.mean())
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.population_std_dev())
}

/// Least-squares slope of `values` against their index (units per observation).
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// Finite values, ascending.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Harrell-Davis quantile estimate of an ascending sample.
///
/// A Beta-weighted average of all order statistics. Unlike the raw empirical
/// quantile it is strictly increasing in `p` whenever the sample holds at
/// least two distinct values, and it makes no distributional assumption.
pub fn harrell_davis_quantile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || !(p > 0.0 && p < 1.0) {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }

    let m = (n + 1) as f64;
    let weights = Beta::new(p * m, (1.0 - p) * m).ok()?;

    let mut previous = 0.0;
    let mut estimate = 0.0;
    for (i, x) in sorted.iter().enumerate() {
        let upper = weights.cdf((i + 1) as f64 / n as f64);
        estimate += (upper - previous) * x;
        previous = upper;
    }
    Some(estimate)
}

/// Damped Holt linear smoothing state after consuming a series.
#[derive(Debug, Clone, PartialEq)]
pub struct HoltFit {
    pub level: f64,
    pub trend: f64,
    pub damping: f64,
    /// (index, one-step forecast, actual) for every observation after the first
    pub one_step: Vec<(usize, f64, f64)>,
}

impl HoltFit {
    /// Forecast `h` steps past the last observation.
    pub fn forecast(&self, h: usize) -> f64 {
        let mut cumulative = 0.0;
        let mut factor = 1.0;
        for _ in 0..h {
            factor *= self.damping;
            cumulative += factor;
        }
        self.level + self.trend * cumulative
    }
}

/// Damped Holt smoothing. `damping = 1.0` gives the undamped method.
pub fn holt_linear(values: &[f64], alpha: f64, beta: f64, damping: f64) -> Option<HoltFit> {
    if values.len() < 2 {
        return None;
    }
    let mut level = values[0];
    let mut trend = values[1] - values[0];
    let mut one_step = Vec::with_capacity(values.len() - 1);

    for (t, &y) in values.iter().enumerate().skip(1) {
        let forecast = level + damping * trend;
        one_step.push((t, forecast, y));
        let new_level = alpha * y + (1.0 - alpha) * forecast;
        trend = beta * (new_level - level) + (1.0 - beta) * damping * trend;
        level = new_level;
    }

    Some(HoltFit {
        level,
        trend,
        damping,
        one_step,
    })
}

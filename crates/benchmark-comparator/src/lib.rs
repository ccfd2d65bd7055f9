//! Benchmark Comparator
//!
//! Places a farm metric against a regional percentile distribution. A value
//! exactly on a boundary falls into the higher tier.

use agro_core::{BenchmarkResult, BenchmarkTier, ForecastError, ForecastResult, PercentileDistribution};

pub fn classify(value: f64, dist: &PercentileDistribution) -> BenchmarkTier {
    if value >= dist.p75 {
        BenchmarkTier::TopQuartile
    } else if value >= dist.p50 {
        BenchmarkTier::AboveAverage
    } else if value >= dist.p25 {
        BenchmarkTier::BelowAverage
    } else {
        BenchmarkTier::BottomQuartile
    }
}

fn validate(dist: &PercentileDistribution) -> ForecastResult<()> {
    let points = [("p25", dist.p25), ("p50", dist.p50), ("p75", dist.p75), ("p90", dist.p90)];
    if let Some((name, _)) = points.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ForecastError::invalid(format!("percentiles.{}", name), "value is not finite"));
    }
    if points.windows(2).any(|w| w[0].1 > w[1].1) {
        return Err(ForecastError::invalid(
            "percentiles",
            format!(
                "must be non-decreasing, got {} / {} / {} / {}",
                dist.p25, dist.p50, dist.p75, dist.p90
            ),
        ));
    }
    Ok(())
}

/// Piecewise-linear position of `value` in the distribution, 0-100. Outside
/// [p25, p90] the nearest segment's slope is extended.
pub fn approximate_percentile(value: f64, dist: &PercentileDistribution) -> f64 {
    let knots = [(dist.p25, 25.0), (dist.p50, 50.0), (dist.p75, 75.0), (dist.p90, 90.0)];

    let segment = if value < dist.p50 {
        0
    } else if value < dist.p75 {
        1
    } else {
        2
    };
    let (x0, y0) = knots[segment];
    let (x1, y1) = knots[segment + 1];

    let position = if x1 > x0 {
        y0 + (value - x0) * (y1 - y0) / (x1 - x0)
    } else if value >= x1 {
        y1
    } else {
        y0
    };
    position.clamp(0.0, 100.0)
}

pub fn compare(metric_name: &str, farm_value: f64, dist: &PercentileDistribution) -> ForecastResult<BenchmarkResult> {
    if !farm_value.is_finite() {
        return Err(ForecastError::invalid("farm_value", "value is not finite"));
    }
    validate(dist)?;

    let tier = classify(farm_value, dist);
    tracing::debug!("{} = {} ranks {}", metric_name, farm_value, tier.as_str());

    Ok(BenchmarkResult {
        metric_name: metric_name.to_string(),
        farm_value,
        percentile_25: dist.p25,
        percentile_50: dist.p50,
        percentile_75: dist.p75,
        percentile_90: dist.p90,
        tier,
        approximate_percentile: approximate_percentile(farm_value, dist),
    })
}

//! Vegetation Stress Analysis
//!
//! Summarises a satellite NDVI series into a stress level, trend and anomaly list.

use agro_core::stats::{linear_slope, mean, std_dev};
use agro_core::{ForecastError, ForecastResult, VegetationObservation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Minimum readings for a meaningful trend
pub const MIN_NDVI_OBSERVATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl StressLevel {
    pub fn from_mean_ndvi(mean_ndvi: f64) -> Self {
        match mean_ndvi {
            m if m > 0.7 => StressLevel::Low,
            m if m > 0.5 => StressLevel::Moderate,
            m if m > 0.3 => StressLevel::High,
            _ => StressLevel::Severe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

impl TrendDirection {
    pub fn from_slope(slope: f64) -> Self {
        if slope > 0.01 {
            TrendDirection::Improving
        } else if slope < -0.01 {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Low,
    Moderate,
    High,
}

impl Significance {
    pub fn from_slope(slope: f64) -> Self {
        let magnitude = slope.abs();
        if magnitude > 0.02 {
            Significance::High
        } else if magnitude > 0.005 {
            Significance::Moderate
        } else {
            Significance::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdviAnomaly {
    pub date: NaiveDate,
    pub ndvi: f64,
    pub deviation: f64,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationStress {
    pub stress_level: StressLevel,
    /// 0-0.95, lower for noisier series
    pub confidence: f64,
    pub mean_ndvi: f64,
    pub std_ndvi: f64,
    pub min_ndvi: f64,
    pub max_ndvi: f64,
    pub coefficient_of_variation: f64,
    /// NDVI change per observation
    pub slope: f64,
    pub trend: TrendDirection,
    pub significance: Significance,
    pub anomalies: Vec<NdviAnomaly>,
    pub recommendations: Vec<String>,
    pub observations: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Analyse an NDVI series. Readings need not be sorted.
pub fn analyze_stress(observations: &[VegetationObservation]) -> ForecastResult<VegetationStress> {
    let mut series: Vec<&VegetationObservation> = observations
        .iter()
        .filter(|o| o.ndvi.is_finite())
        .collect();
    if series.len() < MIN_NDVI_OBSERVATIONS {
        return Err(ForecastError::insufficient(
            ["ndvi"],
            format!(
                "{} usable NDVI observations; at least {} required",
                series.len(),
                MIN_NDVI_OBSERVATIONS
            ),
        ));
    }
    series.sort_by_key(|o| o.date);

    let values: Vec<f64> = series.iter().map(|o| o.ndvi).collect();
    // len >= 3 so all of these are defined
    let mean_ndvi = mean(&values).unwrap_or_default();
    let std_ndvi = std_dev(&values).unwrap_or_default();
    let slope = linear_slope(&values).unwrap_or_default();
    let min_ndvi = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max_ndvi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let coefficient_of_variation = if mean_ndvi > 0.0 { std_ndvi / mean_ndvi } else { 0.0 };

    let threshold = 2.0 * std_ndvi;
    let anomalies: Vec<NdviAnomaly> = series
        .iter()
        .filter(|o| (o.ndvi - mean_ndvi).abs() > threshold)
        .map(|o| NdviAnomaly {
            date: o.date,
            ndvi: o.ndvi,
            deviation: (o.ndvi - mean_ndvi).abs(),
            kind: if o.ndvi < mean_ndvi {
                AnomalyKind::Low
            } else {
                AnomalyKind::High
            },
        })
        .collect();

    let stress_level = StressLevel::from_mean_ndvi(mean_ndvi);
    let trend = TrendDirection::from_slope(slope);
    let recommendations = recommendations(stress_level, trend, anomalies.len());

    Ok(VegetationStress {
        stress_level,
        confidence: (0.7 + (1.0 - coefficient_of_variation) * 0.25).min(0.95),
        mean_ndvi,
        std_ndvi,
        min_ndvi,
        max_ndvi,
        coefficient_of_variation,
        slope,
        trend,
        significance: Significance::from_slope(slope),
        anomalies,
        recommendations,
        observations: series.len(),
        first_date: series[0].date,
        last_date: series[series.len() - 1].date,
    })
}

fn recommendations(level: StressLevel, trend: TrendDirection, anomaly_count: usize) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();

    match level {
        StressLevel::Severe => out.extend([
            "Irrigate immediately to prevent crop damage",
            "Consider an emergency nutrient application",
            "Scout for pest or disease problems",
        ]),
        StressLevel::High => out.extend([
            "Increase irrigation frequency",
            "Monitor pest and disease pressure",
            "Consider stress-reducing treatments",
        ]),
        StressLevel::Moderate => out.extend([
            "Optimize irrigation timing",
            "Monitor crop development closely",
        ]),
        StressLevel::Low => {}
    }

    match trend {
        TrendDirection::Declining => out.extend([
            "Investigate the cause of declining vegetation health",
            "Test soil for nutrient deficiencies",
        ]),
        TrendDirection::Improving => out.push("Continue current management practices"),
        TrendDirection::Stable => {}
    }

    if anomaly_count > 2 {
        out.push("High variability detected; check field uniformity");
        out.push("Consider precision (zone-based) management");
    }

    out.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(values: &[f64]) -> Vec<VegetationObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| VegetationObservation {
                date: start + chrono::Duration::days(10 * i as i64),
                ndvi: *v,
                evi: None,
            })
            .collect()
    }

    #[test]
    fn test_requires_three_observations() {
        let err = analyze_stress(&series(&[0.6, 0.7])).unwrap_err();
        match err {
            ForecastError::InsufficientData { fields, .. } => assert_eq!(fields, vec!["ndvi"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_healthy_improving_canopy() {
        let result = analyze_stress(&series(&[0.70, 0.74, 0.78, 0.82])).unwrap();
        assert_eq!(result.stress_level, StressLevel::Low);
        assert_eq!(result.trend, TrendDirection::Improving);
        assert_eq!(result.significance, Significance::High);
        assert_relative_eq!(result.slope, 0.04, epsilon = 1e-9);
        assert!(result.anomalies.is_empty());
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.contains("Continue current")));
    }

    #[test]
    fn test_declining_stressed_canopy() {
        let result = analyze_stress(&series(&[0.55, 0.45, 0.35, 0.25])).unwrap();
        assert_eq!(result.stress_level, StressLevel::High);
        assert_eq!(result.trend, TrendDirection::Declining);
        assert!(result.recommendations.len() >= 5);
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_date() {
        let mut obs = series(&[0.3, 0.5, 0.7]);
        obs.reverse();
        let result = analyze_stress(&obs).unwrap();
        assert!(result.slope > 0.0);
        assert!(result.first_date < result.last_date);
    }

    #[test]
    fn test_anomaly_detection() {
        let mut values = vec![0.6; 9];
        values.push(0.1);
        let result = analyze_stress(&series(&values)).unwrap();
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].kind, AnomalyKind::Low);
    }
}

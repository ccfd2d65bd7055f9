//! Confidence bands: empirical volatility scaled by horizon and calendar month,
//! with a monotone width floor.

use agro_core::stats::{harrell_davis_quantile, sorted_finite, std_dev};
use agro_core::ConfidenceLevel;

/// Relative half-widths and per-month volatility multipliers fitted on
/// one-step residuals.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityProfile {
    lower: f64,
    upper: f64,
    month_factors: [f64; 12],
}

impl VolatilityProfile {
    /// `residuals` pairs the calendar month (1-12) of each observation with its
    /// relative one-step error.
    pub fn fit(
        residuals: &[(u32, f64)],
        confidence: ConfidenceLevel,
        min_half_width: f64,
        month_factor_bounds: (f64, f64),
    ) -> Self {
        let values: Vec<f64> = residuals.iter().map(|(_, r)| *r).collect();
        let sorted = sorted_finite(&values);

        let lower = harrell_davis_quantile(&sorted, confidence.lower_tail())
            .map(|q| (-q).max(0.0))
            .unwrap_or(0.0)
            .max(min_half_width);
        let upper = harrell_davis_quantile(&sorted, confidence.upper_tail())
            .map(|q| q.max(0.0))
            .unwrap_or(0.0)
            .max(min_half_width);

        let mut month_factors = [1.0; 12];
        if let Some(overall) = std_dev(&sorted).filter(|sd| *sd > 0.0) {
            for (slot, factor) in month_factors.iter_mut().enumerate() {
                let month = slot as u32 + 1;
                let in_month: Vec<f64> = residuals
                    .iter()
                    .filter(|(m, r)| *m == month && r.is_finite())
                    .map(|(_, r)| *r)
                    .collect();
                if in_month.len() < 2 {
                    continue;
                }
                if let Some(sd) = std_dev(&in_month) {
                    *factor = (sd / overall).clamp(month_factor_bounds.0, month_factor_bounds.1);
                }
            }
        }

        Self {
            lower,
            upper,
            month_factors,
        }
    }

    pub fn month_factor(&self, month: u32) -> f64 {
        self.month_factors
            .get(month.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(1.0)
    }

    /// `(below, above)` the point for step `h` landing in calendar `month`.
    pub fn half_widths(&self, point: f64, h: u32, month: u32) -> (f64, f64) {
        let scale = point.max(0.0) * (h.max(1) as f64).sqrt() * self.month_factor(month);
        (scale * self.lower, scale * self.upper)
    }
}

/// Applies the width floor across consecutive horizon steps.
#[derive(Debug, Default)]
pub struct MonotoneBand {
    previous_width: f64,
}

impl MonotoneBand {
    /// Bounds for the next step. A band narrower than the previous step's is
    /// widened to it; a negative lower bound is clamped at zero with the
    /// excess moved above the point.
    pub fn next(&mut self, point: f64, below: f64, above: f64) -> (f64, f64) {
        let (mut below, mut above) = (below.max(0.0), above.max(0.0));
        let width = below + above;
        if width < self.previous_width {
            if width > 0.0 {
                let stretch = self.previous_width / width;
                below *= stretch;
                above *= stretch;
            } else {
                above = self.previous_width;
            }
        }

        let mut low = point - below;
        let mut high = point + above;
        if low < 0.0 {
            high -= low;
            low = 0.0;
        }
        if high - low < self.previous_width {
            high = low + self.previous_width;
        }

        self.previous_width = self.previous_width.max(high - low);
        (low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_floor_widens_narrow_step() {
        let mut band = MonotoneBand::default();
        let (l1, h1) = band.next(100.0, 10.0, 10.0);
        let (l2, h2) = band.next(100.0, 4.0, 6.0);
        assert_relative_eq!(h1 - l1, 20.0);
        assert_relative_eq!(h2 - l2, 20.0, epsilon = 1e-9);
        // Stretch keeps the skew of the raw band
        assert_relative_eq!(100.0 - l2, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_negative_low_is_clamped_without_losing_width() {
        let mut band = MonotoneBand::default();
        let (low, high) = band.next(5.0, 8.0, 8.0);
        assert_eq!(low, 0.0);
        assert_relative_eq!(high, 16.0);
    }

    #[test]
    fn test_volatile_month_gets_larger_factor() {
        let mut residuals = Vec::new();
        for year in 0..4 {
            for month in 1..=12u32 {
                let swing = if month == 7 { 0.12 } else { 0.02 };
                let sign = if (year + month) % 2 == 0 { 1.0 } else { -1.0 };
                residuals.push((month, sign * swing));
            }
        }
        let profile = VolatilityProfile::fit(&residuals, ConfidenceLevel::P80, 0.005, (0.5, 2.0));
        assert!(profile.month_factor(7) > profile.month_factor(3));
        assert_relative_eq!(profile.month_factor(7), 2.0);

        let (below, above) = profile.half_widths(100.0, 4, 3);
        assert!(below > 0.0 && above > 0.0);
    }
}

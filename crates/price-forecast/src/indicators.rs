use agro_core::{ForecastError, ForecastResult, MarketIndicator};

/// Multiplicative level adjustment from exogenous indicators, clamped to `bounds`.
///
/// Each indicator contributes `1 + elasticity * (value - baseline) / baseline`.
pub fn indicator_factor(indicators: &[MarketIndicator], bounds: (f64, f64)) -> ForecastResult<f64> {
    let mut factor = 1.0;
    for indicator in indicators {
        let finite = indicator.value.is_finite()
            && indicator.baseline.is_finite()
            && indicator.elasticity.is_finite();
        if !finite || indicator.baseline == 0.0 {
            return Err(ForecastError::invalid(
                format!("market_indicator.{}", indicator.name),
                "value, baseline and elasticity must be finite with a non-zero baseline",
            ));
        }
        let deviation = (indicator.value - indicator.baseline) / indicator.baseline;
        factor *= 1.0 + indicator.elasticity * deviation;
    }

    let clamped = factor.clamp(bounds.0, bounds.1);
    if clamped != factor {
        tracing::debug!("Indicator factor {:.3} clamped to {:.3}", factor, clamped);
    }
    Ok(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn indicator(name: &str, value: f64, baseline: f64, elasticity: f64) -> MarketIndicator {
        MarketIndicator {
            name: name.to_string(),
            value,
            baseline,
            elasticity,
        }
    }

    #[test]
    fn test_no_indicators_is_neutral() {
        assert_relative_eq!(indicator_factor(&[], (0.5, 1.5)).unwrap(), 1.0);
    }

    #[test]
    fn test_stocks_above_baseline_lower_price() {
        // Stocks-to-use 20% above normal with elasticity -0.5
        let factor = indicator_factor(&[indicator("stocks_to_use", 0.18, 0.15, -0.5)], (0.5, 1.5)).unwrap();
        assert_relative_eq!(factor, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_factor_is_clamped() {
        let factor = indicator_factor(&[indicator("basis", 10.0, 1.0, 1.0)], (0.5, 1.5)).unwrap();
        assert_relative_eq!(factor, 1.5);
    }

    #[test]
    fn test_zero_baseline_is_invalid() {
        assert!(indicator_factor(&[indicator("basis", 1.0, 0.0, 1.0)], (0.5, 1.5)).is_err());
    }
}

//! Profitability Forecast Engine
//!
//! Composes yield x price - cost into three paired scenarios. Bounds are
//! paired monotonically rather than sampled independently:
//! - optimistic: high yield, high price, low cost
//! - expected: point estimates and the deterministic cost
//! - pessimistic: low yield, low price, high cost
//!
//! Cost is perturbed by a fixed sensitivity band in the outer scenarios.

pub mod drivers;

pub use drivers::rank_drivers;

use agro_core::{
    CostEstimate, ForecastError, ForecastResult, PriceForecast, ProfitabilityForecast,
    ProfitabilityScenario, ScenarioTag, YieldForecast,
};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Relative cost band applied to the outer scenarios, in [0, 1)
    pub cost_sensitivity: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self { cost_sensitivity: 0.10 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfitabilityEngine {
    config: ScenarioConfig,
}

/// One scenario's inputs before profit and drivers are derived.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScenarioInputs {
    yield_value: f64,
    price: f64,
    cost: f64,
}

impl ScenarioInputs {
    fn net_profit(&self) -> f64 {
        self.yield_value * self.price - self.cost
    }
}

impl ProfitabilityEngine {
    pub fn new(config: ScenarioConfig) -> ForecastResult<Self> {
        let s = config.cost_sensitivity;
        if !(s.is_finite() && (0.0..1.0).contains(&s)) {
            return Err(ForecastError::invalid(
                "cost_sensitivity",
                format!("{} is outside [0, 1)", s),
            ));
        }
        Ok(Self { config })
    }

    pub fn cost_sensitivity(&self) -> f64 {
        self.config.cost_sensitivity
    }

    pub fn compose(
        &self,
        yield_forecast: &YieldForecast,
        price_forecast: &PriceForecast,
        cost: &CostEstimate,
    ) -> ForecastResult<ProfitabilityForecast> {
        let cost_value = cost
            .total
            .to_f64()
            .ok_or_else(|| ForecastError::invalid("cost.total", "not representable as f64"))?;

        for (field, value) in [
            ("yield.interval_low", yield_forecast.interval_low),
            ("yield.point_estimate", yield_forecast.point_estimate),
            ("yield.interval_high", yield_forecast.interval_high),
            ("price.interval_low", price_forecast.interval_low),
            ("price.point_estimate", price_forecast.point_estimate),
            ("price.interval_high", price_forecast.interval_high),
            ("cost.total", cost_value),
        ] {
            if !value.is_finite() {
                return Err(ForecastError::invalid(field, "value is not finite"));
            }
        }

        let s = self.config.cost_sensitivity;
        let expected = ScenarioInputs {
            yield_value: yield_forecast.point_estimate,
            price: price_forecast.point_estimate,
            cost: cost_value,
        };
        let optimistic = ScenarioInputs {
            yield_value: yield_forecast.interval_high,
            price: price_forecast.interval_high,
            cost: cost_value * (1.0 - s),
        };
        let pessimistic = ScenarioInputs {
            yield_value: yield_forecast.interval_low,
            price: price_forecast.interval_low,
            cost: cost_value * (1.0 + s),
        };

        let inconsistent = check_ordering(
            pessimistic.net_profit(),
            expected.net_profit(),
            optimistic.net_profit(),
        )
        .is_err();

        let forecast = ProfitabilityForecast {
            field_id: yield_forecast.field_id.clone(),
            crop_id: yield_forecast.crop_id.clone(),
            horizon_date: yield_forecast.horizon_date,
            optimistic: scenario(ScenarioTag::Optimistic, optimistic, expected),
            expected: scenario(ScenarioTag::Expected, expected, expected),
            pessimistic: scenario(ScenarioTag::Pessimistic, pessimistic, expected),
            inconsistent,
            degraded_yield: yield_forecast.degraded,
            cost_sensitivity: s,
        };

        tracing::info!(
            "Profitability {}/{}: pessimistic={:.2} expected={:.2} optimistic={:.2}",
            forecast.field_id,
            forecast.crop_id,
            forecast.pessimistic.net_profit,
            forecast.expected.net_profit,
            forecast.optimistic.net_profit
        );

        Ok(forecast)
    }
}

/// Profit must satisfy pessimistic <= expected <= optimistic. A violation is
/// logged and returned, never repaired by reordering.
pub fn check_ordering(pessimistic: f64, expected: f64, optimistic: f64) -> ForecastResult<()> {
    if pessimistic <= expected && expected <= optimistic {
        return Ok(());
    }
    let err = ForecastError::ScenarioOrdering {
        pessimistic,
        expected,
        optimistic,
    };
    tracing::error!("{}", err);
    Err(err)
}

fn scenario(tag: ScenarioTag, inputs: ScenarioInputs, expected: ScenarioInputs) -> ProfitabilityScenario {
    let drivers = rank_drivers(
        (inputs.yield_value, expected.yield_value),
        (inputs.price, expected.price),
        (inputs.cost, expected.cost),
    );
    let key_driver = drivers
        .first()
        .filter(|d| d.contribution != 0.0)
        .map(|d| d.factor);

    ProfitabilityScenario {
        scenario: tag,
        yield_value: inputs.yield_value,
        price: inputs.price,
        cost: inputs.cost,
        net_profit: inputs.net_profit(),
        drivers,
        key_driver,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_core::{Commodity, ConfidenceLevel, CropId, DriverFactor, FieldId};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn yield_forecast(low: f64, point: f64, high: f64) -> YieldForecast {
        YieldForecast {
            field_id: FieldId::new("field-1"),
            crop_id: CropId::new("corn"),
            horizon_date: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            point_estimate: point,
            interval_low: low,
            interval_high: high,
            confidence_level: ConfidenceLevel::P80,
            model_version: "test".to_string(),
            degraded: false,
            members: Vec::new(),
            dropped: Vec::new(),
            feature_importance: BTreeMap::new(),
        }
    }

    fn price_forecast(low: f64, point: f64, high: f64) -> PriceForecast {
        PriceForecast {
            commodity: Commodity::new("corn"),
            horizon_date: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            point_estimate: point,
            interval_low: low,
            interval_high: high,
            confidence_level: ConfidenceLevel::P80,
        }
    }

    fn cost(total: rust_decimal::Decimal) -> CostEstimate {
        CostEstimate {
            total,
            lines: Vec::new(),
            by_category: BTreeMap::new(),
        }
    }

    #[test]
    fn test_paired_scenarios() {
        let forecast = ProfitabilityEngine::default()
            .compose(
                &yield_forecast(8.0, 10.0, 11.0),
                &price_forecast(150.0, 180.0, 200.0),
                &cost(dec!(1000)),
            )
            .unwrap();

        assert_relative_eq!(forecast.expected.net_profit, 10.0 * 180.0 - 1000.0);
        assert_relative_eq!(forecast.optimistic.net_profit, 11.0 * 200.0 - 900.0);
        assert_relative_eq!(forecast.pessimistic.net_profit, 8.0 * 150.0 - 1100.0);
        assert!(!forecast.inconsistent);
        assert_eq!(forecast.expected.key_driver, None);
    }

    #[test]
    fn test_ordering_holds_across_inputs() {
        let engine = ProfitabilityEngine::new(ScenarioConfig { cost_sensitivity: 0.2 }).unwrap();
        for spread in [0.0, 0.05, 0.3, 0.9] {
            for total in [dec!(0), dec!(500), dec!(5000)] {
                let forecast = engine
                    .compose(
                        &yield_forecast(6.0 * (1.0 - spread), 6.0, 6.0 * (1.0 + spread)),
                        &price_forecast(200.0 * (1.0 - spread), 200.0, 200.0 * (1.0 + spread)),
                        &cost(total),
                    )
                    .unwrap();
                assert!(!forecast.inconsistent);
                assert!(forecast.pessimistic.net_profit <= forecast.expected.net_profit);
                assert!(forecast.expected.net_profit <= forecast.optimistic.net_profit);
            }
        }
    }

    #[test]
    fn test_miscalibrated_inputs_flag_inconsistent_without_reordering() {
        // Yield "low" bound above the point
        let forecast = ProfitabilityEngine::default()
            .compose(
                &yield_forecast(12.0, 10.0, 11.0),
                &price_forecast(180.0, 180.0, 180.0),
                &cost(dec!(1000)),
            )
            .unwrap();
        assert!(forecast.inconsistent);
        assert_eq!(forecast.pessimistic.scenario, ScenarioTag::Pessimistic);
        assert_relative_eq!(forecast.pessimistic.yield_value, 12.0);
        assert!(forecast.pessimistic.net_profit > forecast.expected.net_profit);
    }

    #[test]
    fn test_key_driver_is_largest_contribution() {
        // Price swing dominates: +/-20% price vs +/-2% yield
        let forecast = ProfitabilityEngine::default()
            .compose(
                &yield_forecast(9.8, 10.0, 10.2),
                &price_forecast(144.0, 180.0, 216.0),
                &cost(dec!(1000)),
            )
            .unwrap();
        assert_eq!(forecast.optimistic.key_driver, Some(DriverFactor::Price));
        assert_eq!(forecast.pessimistic.key_driver, Some(DriverFactor::Price));

        let delta = forecast.optimistic.net_profit - forecast.expected.net_profit;
        let sum: f64 = forecast.optimistic.drivers.iter().map(|d| d.contribution).sum();
        assert_relative_eq!(sum, delta, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_sensitivity_out_of_range() {
        assert!(ProfitabilityEngine::new(ScenarioConfig { cost_sensitivity: 1.0 }).is_err());
        assert!(ProfitabilityEngine::new(ScenarioConfig { cost_sensitivity: -0.1 }).is_err());
    }

    #[test]
    fn test_non_finite_input_is_invalid() {
        let err = ProfitabilityEngine::default()
            .compose(
                &yield_forecast(8.0, f64::NAN, 11.0),
                &price_forecast(150.0, 180.0, 200.0),
                &cost(dec!(1000)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("yield.point_estimate"));
    }
}

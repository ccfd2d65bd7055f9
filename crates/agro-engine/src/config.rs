use anyhow::{Context, Result};
use feature_assembler::FeatureAssemblerConfig;
use price_forecast::PriceModelConfig;
use profitability_engine::ScenarioConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use yield_forecast::YieldModelConfig;

use agro_core::ConfidenceLevel;

/// Longest look-back any assembler window may span (about a century).
pub const MAX_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // Inference budget
    pub inference_timeout_ms: u64,         // 2000

    // Interval levels
    pub scenario_confidence: ConfidenceLevel, // 0.80, bounds drawn for scenarios
    pub price_confidence: ConfidenceLevel,    // 0.80, standalone price bands

    // Batch scheduling
    pub max_concurrency: usize,            // 8 in-flight requests

    // Logging
    pub log_json: bool,

    // Components
    pub assembler: FeatureAssemblerConfig,
    pub yield_model: YieldModelConfig,
    pub price_model: PriceModelConfig,
    pub scenario: ScenarioConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inference_timeout_ms: 2000,
            scenario_confidence: ConfidenceLevel::P80,
            price_confidence: ConfidenceLevel::P80,
            max_concurrency: 8,
            log_json: false,
            assembler: FeatureAssemblerConfig::default(),
            yield_model: YieldModelConfig::default(),
            price_model: PriceModelConfig::default(),
            scenario: ScenarioConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let scenario_confidence: f64 = parse_or(&lookup, "AGRO_SCENARIO_CONFIDENCE", 0.80)?;
        let price_confidence: f64 = parse_or(&lookup, "AGRO_PRICE_CONFIDENCE", 0.80)?;

        let config = Self {
            inference_timeout_ms: parse_or(&lookup, "AGRO_INFERENCE_TIMEOUT_MS", defaults.inference_timeout_ms)?,
            scenario_confidence: ConfidenceLevel::new(scenario_confidence)
                .context("AGRO_SCENARIO_CONFIDENCE must lie in (0, 1)")?,
            price_confidence: ConfidenceLevel::new(price_confidence)
                .context("AGRO_PRICE_CONFIDENCE must lie in (0, 1)")?,
            max_concurrency: parse_or(&lookup, "AGRO_MAX_CONCURRENCY", defaults.max_concurrency)?,
            log_json: parse_or(&lookup, "AGRO_LOG_JSON", defaults.log_json)?,

            assembler: FeatureAssemblerConfig {
                min_weather_observations: parse_or(
                    &lookup,
                    "AGRO_MIN_WEATHER_OBS",
                    defaults.assembler.min_weather_observations,
                )?,
                weather_window_days: parse_or(
                    &lookup,
                    "AGRO_WEATHER_WINDOW_DAYS",
                    defaults.assembler.weather_window_days,
                )?,
                season_window_days: parse_or(
                    &lookup,
                    "AGRO_SEASON_WINDOW_DAYS",
                    defaults.assembler.season_window_days,
                )?,
                ..defaults.assembler
            },
            yield_model: YieldModelConfig {
                tree_weight: parse_or(&lookup, "AGRO_TREE_WEIGHT", defaults.yield_model.tree_weight)?,
                trend_weight: parse_or(&lookup, "AGRO_TREND_WEIGHT", defaults.yield_model.trend_weight)?,
                ..defaults.yield_model
            },
            price_model: defaults.price_model,
            scenario: ScenarioConfig {
                cost_sensitivity: parse_or(
                    &lookup,
                    "AGRO_COST_SENSITIVITY",
                    defaults.scenario.cost_sensitivity,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inference_timeout_ms == 0 {
            anyhow::bail!("AGRO_INFERENCE_TIMEOUT_MS must be positive");
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("AGRO_MAX_CONCURRENCY must be at least 1");
        }
        for (key, days) in [
            ("AGRO_WEATHER_WINDOW_DAYS", self.assembler.weather_window_days),
            ("AGRO_SEASON_WINDOW_DAYS", self.assembler.season_window_days),
        ] {
            if !(1..=MAX_WINDOW_DAYS).contains(&days) {
                anyhow::bail!("{} must lie in [1, {}], got {}", key, MAX_WINDOW_DAYS, days);
            }
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.assembler.soil_max_age_days) {
            anyhow::bail!(
                "soil_max_age_days must lie in [0, {}], got {}",
                MAX_WINDOW_DAYS,
                self.assembler.soil_max_age_days
            );
        }
        let s = self.scenario.cost_sensitivity;
        if !(s.is_finite() && (0.0..1.0).contains(&s)) {
            anyhow::bail!("AGRO_COST_SENSITIVITY must lie in [0, 1), got {}", s);
        }
        self.yield_model
            .validate()
            .context("invalid ensemble weights")?;
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an unparseable value '{}'", key, raw)),
        None => Ok(default),
    }
}

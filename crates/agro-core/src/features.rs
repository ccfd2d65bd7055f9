//! Feature vectors and the raw observation series they are assembled from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CropId, FieldId};

/// Named slot of a [`FeatureVector`], in fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    NdviMean,
    NdviTrend,
    SoilPh,
    SoilOrganicMatter,
    SoilN,
    SoilP,
    SoilK,
    Gdd,
    CumulativePrecip,
    MeanTemp,
    PriorYield,
    YieldTrend,
}

impl Feature {
    pub const COUNT: usize = 12;

    pub const ALL: [Feature; Feature::COUNT] = [
        Feature::NdviMean,
        Feature::NdviTrend,
        Feature::SoilPh,
        Feature::SoilOrganicMatter,
        Feature::SoilN,
        Feature::SoilP,
        Feature::SoilK,
        Feature::Gdd,
        Feature::CumulativePrecip,
        Feature::MeanTemp,
        Feature::PriorYield,
        Feature::YieldTrend,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::NdviMean => "ndvi_mean",
            Feature::NdviTrend => "ndvi_trend",
            Feature::SoilPh => "soil_ph",
            Feature::SoilOrganicMatter => "soil_organic_matter",
            Feature::SoilN => "soil_n",
            Feature::SoilP => "soil_p",
            Feature::SoilK => "soil_k",
            Feature::Gdd => "gdd",
            Feature::CumulativePrecip => "cumulative_precip",
            Feature::MeanTemp => "mean_temp",
            Feature::PriorYield => "prior_yield",
            Feature::YieldTrend => "yield_trend",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-shape feature vector. `None` marks a missing value; nothing is zero-filled here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub field_id: FieldId,
    pub crop_id: CropId,
    pub as_of: NaiveDate,
    values: [Option<f64>; Feature::COUNT],
}

impl FeatureVector {
    pub fn empty(field_id: FieldId, crop_id: CropId, as_of: NaiveDate) -> Self {
        Self {
            field_id,
            crop_id,
            as_of,
            values: [None; Feature::COUNT],
        }
    }

    /// Non-finite values are stored as missing.
    pub fn set(&mut self, feature: Feature, value: Option<f64>) {
        self.values[feature.index()] = value.filter(|v| v.is_finite());
    }

    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        self.set(feature, Some(value));
        self
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values[feature.index()]
    }

    pub fn is_missing(&self, feature: Feature) -> bool {
        self.get(feature).is_none()
    }

    pub fn missing(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|f| self.is_missing(*f))
            .collect()
    }

    /// Which of `required` are missing, in the order given.
    pub fn missing_of(&self, required: &[Feature]) -> Vec<Feature> {
        required
            .iter()
            .copied()
            .filter(|f| self.is_missing(*f))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, Option<f64>)> + '_ {
        Feature::ALL.into_iter().map(move |f| (f, self.get(f)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub date: NaiveDate,
    pub temperature_min: f64,
    pub temperature_max: f64,
    /// mm
    pub precipitation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSample {
    pub sampled_on: NaiveDate,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub organic_matter: Option<f64>,
    #[serde(default)]
    pub nitrogen: Option<f64>,
    #[serde(default)]
    pub phosphorus: Option<f64>,
    #[serde(default)]
    pub potassium: Option<f64>,
}

/// Satellite vegetation index reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationObservation {
    pub date: NaiveDate,
    pub ndvi: f64,
    #[serde(default)]
    pub evi: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonYield {
    pub season: i32,
    /// Realized yield, same unit as forecasts (t/ha)
    pub observed: f64,
}

/// Everything the assembler needs about one field, as delivered by collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldHistory {
    #[serde(default)]
    pub weather: Vec<WeatherObservation>,
    #[serde(default)]
    pub soil: Vec<SoilSample>,
    #[serde(default)]
    pub vegetation: Vec<VegetationObservation>,
    #[serde(default)]
    pub yields: Vec<SeasonYield>,
}

/// Historical feature snapshot paired with the yield that followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub season: i32,
    pub features: FeatureVector,
    pub observed_yield: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector() -> FeatureVector {
        FeatureVector::empty(
            FieldId::new("field-1"),
            CropId::new("corn"),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        )
    }

    #[test]
    fn test_feature_order_matches_index() {
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
        }
    }

    #[test]
    fn test_missing_is_explicit() {
        let fv = vector().with(Feature::Gdd, 1200.0).with(Feature::SoilN, 0.0);
        assert_eq!(fv.get(Feature::SoilN), Some(0.0));
        assert!(fv.is_missing(Feature::SoilP));
        assert_eq!(fv.missing().len(), Feature::COUNT - 2);
        assert_eq!(
            fv.missing_of(&[Feature::Gdd, Feature::PriorYield]),
            vec![Feature::PriorYield]
        );
    }

    #[test]
    fn test_non_finite_stored_as_missing() {
        let mut fv = vector();
        fv.set(Feature::MeanTemp, Some(f64::NAN));
        assert!(fv.is_missing(Feature::MeanTemp));
    }
}

//! Per-window feature computation
//!
//! Every ready window is reduced to six statistics per channel. The name
//! order in [`FEATURE_NAMES`] is the contract shared with the scoring model
//! and with positional sinks; do not reorder it.

use super::reading::{Channel, SensorReading, CHANNEL_COUNT};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    Mean,
    Std,
    Min,
    Max,
    Slope,
    Delta,
}

impl Statistic {
    pub const ALL: [Statistic; 6] = [
        Statistic::Mean,
        Statistic::Std,
        Statistic::Min,
        Statistic::Max,
        Statistic::Slope,
        Statistic::Delta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Std => "std",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Slope => "slope",
            Statistic::Delta => "delta",
        }
    }
}

pub const FEATURE_COUNT: usize = CHANNEL_COUNT * Statistic::ALL.len();

/// Canonical feature names, channel-major
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temp_c_mean", "temp_c_std", "temp_c_min", "temp_c_max", "temp_c_slope", "temp_c_delta",
    "humidity_mean", "humidity_std", "humidity_min", "humidity_max", "humidity_slope", "humidity_delta",
    "gas_ppm_mean", "gas_ppm_std", "gas_ppm_min", "gas_ppm_max", "gas_ppm_slope", "gas_ppm_delta",
    "smoke_mean", "smoke_std", "smoke_min", "smoke_max", "smoke_slope", "smoke_delta",
    "battery_v_mean", "battery_v_std", "battery_v_min", "battery_v_max", "battery_v_slope", "battery_v_delta",
];

/// Canonical name of one channel statistic
pub fn feature_name(channel: Channel, stat: Statistic) -> &'static str {
    let stat_index = Statistic::ALL
        .iter()
        .position(|s| *s == stat)
        .unwrap_or_default();
    FEATURE_NAMES[channel.index() * Statistic::ALL.len() + stat_index]
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureContractError {
    #[error("feature vector is missing '{0}'")]
    Missing(String),
    #[error("feature vector has unexpected entry '{0}'")]
    Unexpected(String),
    #[error("feature '{found}' at position {position}, expected '{expected}'")]
    OutOfOrder {
        position: usize,
        expected: String,
        found: String,
    },
}

/// Ordered (name, value) pairs produced from one window
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a feature, appending it if the name is new
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Verify the vector matches [`FEATURE_NAMES`] exactly, name for name
    pub fn check_contract(&self) -> Result<(), FeatureContractError> {
        for expected in FEATURE_NAMES {
            if self.get(expected).is_none() {
                return Err(FeatureContractError::Missing(expected.to_string()));
            }
        }

        if let Some((name, _)) = self
            .entries
            .iter()
            .find(|(n, _)| !FEATURE_NAMES.contains(&n.as_str()))
        {
            return Err(FeatureContractError::Unexpected(name.clone()));
        }

        for (position, ((found, _), expected)) in self.entries.iter().zip(FEATURE_NAMES).enumerate() {
            if found != expected {
                return Err(FeatureContractError::OutOfOrder {
                    position,
                    expected: expected.to_string(),
                    found: found.clone(),
                });
            }
        }

        Ok(())
    }

    /// Values in canonical order, ready for a model
    pub fn model_input(&self) -> Result<[f64; FEATURE_COUNT], FeatureContractError> {
        self.check_contract()?;

        let mut input = [0.0; FEATURE_COUNT];
        for (slot, (_, value)) in input.iter_mut().zip(&self.entries) {
            *slot = *value;
        }
        Ok(input)
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Derives the canonical feature vector from a window snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Compute all channel statistics. Pure function of `window`.
    pub fn extract(&self, window: &[SensorReading]) -> FeatureVector {
        let mut features = FeatureVector {
            entries: Vec::with_capacity(FEATURE_COUNT),
        };

        for channel in Channel::ALL {
            let values: Vec<f64> = window.iter().map(|r| r.value(channel)).collect();
            let stats = ChannelStats::compute(&values);

            for stat in Statistic::ALL {
                features
                    .entries
                    .push((feature_name(channel, stat).to_string(), stats.get(stat)));
            }
        }

        features
    }
}

#[derive(Debug, Default)]
struct ChannelStats {
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
    slope: f64,
    delta: f64,
}

impl ChannelStats {
    fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            mean,
            std: variance.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            slope: slope(values),
            delta: delta(values),
        }
    }

    fn get(&self, stat: Statistic) -> f64 {
        match stat {
            Statistic::Mean => self.mean,
            Statistic::Std => self.std,
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Slope => self.slope,
            Statistic::Delta => self.delta,
        }
    }
}

/// Least-squares slope of value against index position 0..n-1
///
/// Population covariance over population variance of the index; 0 when
/// fewer than two values or the index variance is zero.
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let count = n as f64;
    let x_mean = (count - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / count;

    let mut covariance = 0.0;
    let mut x_variance = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        covariance += dx * (y - y_mean);
        x_variance += dx * dx;
    }
    covariance /= count;
    x_variance /= count;

    if x_variance == 0.0 {
        return 0.0;
    }
    covariance / x_variance
}

/// Last value minus second-to-last; 0 when fewer than two values
pub fn delta(values: &[f64]) -> f64 {
    match values {
        [.., prev, last] => last - prev,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window(temps: &[f64]) -> Vec<SensorReading> {
        temps
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let ts = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
                SensorReading::new(ts, [*t, 0.45, 12.0, 0.02, 3.75])
            })
            .collect()
    }

    #[test]
    fn test_canonical_names_match_channel_statistic_order() {
        let mut generated = Vec::new();
        for channel in Channel::ALL {
            for stat in Statistic::ALL {
                generated.push(format!("{}_{}", channel.as_str(), stat.as_str()));
            }
        }

        assert_eq!(generated, FEATURE_NAMES.to_vec());
    }

    #[test]
    fn test_extract_order_is_canonical() {
        let features = FeatureExtractor::new().extract(&window(&[20.0, 21.0, 22.0]));

        let names: Vec<&str> = features.iter().map(|(n, _)| n).collect();
        assert_eq!(names, FEATURE_NAMES.to_vec());
        assert!(features.check_contract().is_ok());
    }

    #[test]
    fn test_temperature_ramp_statistics() {
        let features = FeatureExtractor::new().extract(&window(&[20.0, 21.0, 22.0]));

        assert!((features.get("temp_c_mean").unwrap() - 21.0).abs() < 1e-12);
        assert!((features.get("temp_c_slope").unwrap() - 1.0).abs() < 1e-12);
        assert!((features.get("temp_c_delta").unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(features.get("temp_c_min"), Some(20.0));
        assert_eq!(features.get("temp_c_max"), Some(22.0));
        // population std of {20, 21, 22}
        assert!((features.get("temp_c_std").unwrap() - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);

        assert_eq!(features.get("gas_ppm_std"), Some(0.0));
        assert_eq!(features.get("gas_ppm_slope"), Some(0.0));
        assert_eq!(features.get("gas_ppm_delta"), Some(0.0));
    }

    #[test]
    fn test_slope_constant_is_zero() {
        assert_eq!(slope(&[5.0, 5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_slope_arithmetic_sequence() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 - 0.25 * i as f64).collect();
        assert!((slope(&values) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_windows() {
        assert_eq!(slope(&[4.2]), 0.0);
        assert_eq!(delta(&[4.2]), 0.0);
        assert_eq!(slope(&[]), 0.0);

        let features = FeatureExtractor::new().extract(&window(&[19.5]));
        assert_eq!(features.get("temp_c_delta"), Some(0.0));
        assert_eq!(features.get("temp_c_slope"), Some(0.0));
        assert_eq!(features.get("temp_c_std"), Some(0.0));
    }

    #[test]
    fn test_contract_missing_feature() {
        let mut features = FeatureExtractor::new().extract(&window(&[20.0, 21.0]));
        features.remove("smoke_std");

        assert_eq!(
            features.check_contract(),
            Err(FeatureContractError::Missing("smoke_std".to_string()))
        );
        assert!(features.model_input().is_err());
    }

    #[test]
    fn test_contract_unexpected_and_reordered() {
        let mut extra = FeatureExtractor::new().extract(&window(&[20.0, 21.0]));
        extra.insert("pressure_mean", 1.0);
        assert_eq!(
            extra.check_contract(),
            Err(FeatureContractError::Unexpected("pressure_mean".to_string()))
        );

        let mut reordered = FeatureVector::new();
        for name in FEATURE_NAMES.iter().rev() {
            reordered.insert(*name, 0.0);
        }
        assert!(matches!(
            reordered.check_contract(),
            Err(FeatureContractError::OutOfOrder { position: 0, .. })
        ));
    }

    #[test]
    fn test_serializes_in_canonical_order() {
        let features = FeatureExtractor::new().extract(&window(&[20.0, 21.0]));
        let json = serde_json::to_string(&features).unwrap();

        let first = json.find("\"temp_c_mean\"").unwrap();
        let last = json.find("\"battery_v_delta\"").unwrap();
        assert!(first < last);
        assert!(json.find("\"humidity_mean\"").unwrap() < json.find("\"gas_ppm_mean\"").unwrap());
    }
}

//! Root-cause labelling with an ordered rule list
//!
//! Rules are checked in priority order and the first match wins. Each rule
//! carries its own default for a missing feature, picked so that an absent
//! feature can never make that rule match.

use super::features::FeatureVector;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootCause {
    GasSpike,
    GasStuck,
    TempDrift,
    SmokeNoise,
    Unknown,
}

impl RootCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootCause::GasSpike => "gas_spike",
            RootCause::GasStuck => "gas_stuck",
            RootCause::TempDrift => "temp_drift",
            RootCause::SmokeNoise => "smoke_noise",
            RootCause::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RootCause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    Above(f64),
    Below(f64),
    AbsAbove(f64),
}

impl Comparison {
    fn matches(&self, value: f64) -> bool {
        match *self {
            Comparison::Above(limit) => value > limit,
            Comparison::Below(limit) => value < limit,
            Comparison::AbsAbove(limit) => value.abs() > limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootCauseRule {
    pub cause: RootCause,
    pub feature: &'static str,
    pub comparison: Comparison,
    /// Value used when `feature` is absent from the vector
    pub missing_default: f64,
}

impl RootCauseRule {
    pub fn matches(&self, features: &FeatureVector) -> bool {
        let value = features.get(self.feature).unwrap_or(self.missing_default);
        self.comparison.matches(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootCauseThresholds {
    pub gas_spike: f64,
    pub gas_stuck: f64,
    pub temp_drift: f64,
    pub smoke_noise: f64,
}

impl Default for RootCauseThresholds {
    fn default() -> Self {
        Self {
            gas_spike: 30.0,
            gas_stuck: 0.05,
            temp_drift: 0.01,
            smoke_noise: 0.05,
        }
    }
}

pub struct RootCauseClassifier {
    rules: Vec<RootCauseRule>,
}

impl RootCauseClassifier {
    pub fn new(thresholds: RootCauseThresholds) -> Self {
        Self::with_rules(vec![
            RootCauseRule {
                cause: RootCause::GasSpike,
                feature: "gas_ppm_mean",
                comparison: Comparison::Above(thresholds.gas_spike),
                missing_default: 0.0,
            },
            RootCauseRule {
                cause: RootCause::GasStuck,
                feature: "gas_ppm_std",
                comparison: Comparison::Below(thresholds.gas_stuck),
                missing_default: 999.0,
            },
            RootCauseRule {
                cause: RootCause::TempDrift,
                feature: "temp_c_slope",
                comparison: Comparison::AbsAbove(thresholds.temp_drift),
                missing_default: 0.0,
            },
            RootCauseRule {
                cause: RootCause::SmokeNoise,
                feature: "smoke_std",
                comparison: Comparison::Above(thresholds.smoke_noise),
                missing_default: 0.0,
            },
        ])
    }

    pub fn with_defaults() -> Self {
        Self::new(RootCauseThresholds::default())
    }

    /// Custom rule list, checked in the given order
    pub fn with_rules(rules: Vec<RootCauseRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RootCauseRule] {
        &self.rules
    }

    /// First matching rule's cause, or `Unknown` when none match
    pub fn classify(&self, features: &FeatureVector) -> RootCause {
        self.rules
            .iter()
            .find(|rule| rule.matches(features))
            .map(|rule| rule.cause)
            .unwrap_or(RootCause::Unknown)
    }
}

//! Anomaly scoring capability
//!
//! The pipeline never scores windows itself: a scorer is injected into each
//! `StreamProcessor`. Scores follow density-model semantics, so lower means
//! more anomalous.

use super::features::{FeatureContractError, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("feature contract violation: {0}")]
    Contract(#[from] FeatureContractError),
    #[error("model error: {0}")]
    Model(String),
    #[error("scorer returned non-finite score {0}")]
    NonFinite(f64),
}

/// Maps a feature vector to one real-valued score (lower = more anomalous)
pub trait AnomalyScorer: Send + Sync {
    /// Score a window. Implementations must reject vectors that do not match
    /// the canonical feature contract with `ScoreError::Contract`.
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError>;

    /// Get scorer name for logging
    fn name(&self) -> &str;
}

/// Scorer returning the same score for every valid window
#[derive(Debug, Clone)]
pub struct ConstantScorer {
    score: f64,
}

impl ConstantScorer {
    pub fn new(score: f64) -> Self {
        Self { score }
    }
}

impl AnomalyScorer for ConstantScorer {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        features.check_contract()?;
        Ok(self.score)
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Serialized baseline artifact: per-feature standardization fitted offline
#[derive(Debug, Clone, Deserialize)]
pub struct BaselineModel {
    pub version: String,
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Standardizes features with the bundled transform and scores a window by
/// the negated root-mean-square z-score.
#[derive(Debug, Clone)]
pub struct BaselineScorer {
    version: String,
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl BaselineScorer {
    pub fn from_model(model: BaselineModel) -> Result<Self, ScoreError> {
        for (position, expected) in FEATURE_NAMES.iter().enumerate() {
            match model.feature_names.get(position) {
                Some(found) if found == expected => {}
                Some(found) if FEATURE_NAMES.contains(&found.as_str()) => {
                    return Err(FeatureContractError::OutOfOrder {
                        position,
                        expected: expected.to_string(),
                        found: found.clone(),
                    }
                    .into());
                }
                Some(found) => return Err(FeatureContractError::Unexpected(found.clone()).into()),
                None => return Err(FeatureContractError::Missing(expected.to_string()).into()),
            }
        }
        if let Some(extra) = model.feature_names.get(FEATURE_COUNT) {
            return Err(FeatureContractError::Unexpected(extra.clone()).into());
        }

        let mean: [f64; FEATURE_COUNT] = model.mean.as_slice().try_into().map_err(|_| {
            ScoreError::Model(format!(
                "model {} has {} means, expected {}",
                model.version,
                model.mean.len(),
                FEATURE_COUNT
            ))
        })?;
        let mut scale: [f64; FEATURE_COUNT] = model.scale.as_slice().try_into().map_err(|_| {
            ScoreError::Model(format!(
                "model {} has {} scales, expected {}",
                model.version,
                model.scale.len(),
                FEATURE_COUNT
            ))
        })?;

        // Constant training features have zero spread
        for s in scale.iter_mut() {
            if !(s.is_finite() && *s > 0.0) {
                *s = 1.0;
            }
        }

        Ok(Self {
            version: model.version,
            mean,
            scale,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ScoreError> {
        let model: BaselineModel =
            serde_json::from_str(json).map_err(|e| ScoreError::Model(e.to_string()))?;
        Self::from_model(model)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ScoreError::Model(format!("{}: {}", path.display(), e)))?;
        let scorer = Self::from_json(&json)?;

        log::info!("📦 Loaded baseline model {} from {}", scorer.version, path.display());
        Ok(scorer)
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl AnomalyScorer for BaselineScorer {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        let input = features.model_input()?;

        let sum_sq: f64 = input
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (m, s))| ((x - m) / s).powi(2))
            .sum();

        Ok(-(sum_sq / FEATURE_COUNT as f64).sqrt())
    }

    fn name(&self) -> &str {
        "baseline"
    }
}

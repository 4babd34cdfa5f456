//! Raw per-window anomaly decision against a fixed threshold

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyDecision {
    pub score: f64,
    pub is_anomaly: bool,
}

pub struct ThresholdDetector {
    threshold: f64,
}

impl ThresholdDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A window is anomalous when its score is strictly below the threshold
    pub fn decide(&self, score: f64) -> AnomalyDecision {
        AnomalyDecision {
            score,
            is_anomaly: score < self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_is_anomaly() {
        let detector = ThresholdDetector::new(-0.5);

        assert!(detector.decide(-1.0).is_anomaly);
        assert!(!detector.decide(0.2).is_anomaly);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let detector = ThresholdDetector::new(-0.649129);

        let decision = detector.decide(-0.649129);
        assert!(!decision.is_anomaly);
        assert_eq!(decision.score, -0.649129);
    }
}

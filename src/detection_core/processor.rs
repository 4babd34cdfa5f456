//! Per-stream orchestration: reading → window → features → score → alert → record

use super::alert::{AlertPolicy, AlertPolicyError, AlertState, AlertStateMachine};
use super::detector::ThresholdDetector;
use super::features::{FeatureContractError, FeatureExtractor, FeatureVector};
use super::reading::{ReadingError, SensorReading};
use super::root_cause::{RootCause, RootCauseClassifier, RootCauseThresholds};
use super::scorer::{AnomalyScorer, ScoreError};
use super::window::WindowBuffer;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("reading rejected: {0}")]
    Rejected(#[from] ReadingError),
    #[error("{0}")]
    Contract(#[from] FeatureContractError),
    #[error("scorer failed: {0}")]
    Scorer(ScoreError),
}

impl From<ScoreError> for ProcessError {
    fn from(err: ScoreError) -> Self {
        match err {
            ScoreError::Contract(e) => ProcessError::Contract(e),
            other => ProcessError::Scorer(other),
        }
    }
}

/// One scored window, in the stable output field order
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    /// Routing key for sinks, not part of the serialized record
    #[serde(skip)]
    pub stream_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub features: FeatureVector,
    pub score: f64,
    #[serde(serialize_with = "as_flag")]
    pub is_anomaly: bool,
    #[serde(serialize_with = "as_flag")]
    pub alert_active: bool,
    #[serde(serialize_with = "cause_or_empty")]
    pub root_cause: Option<RootCause>,
}

impl ScoredRecord {
    /// Root-cause label, empty while the alert is inactive
    pub fn root_cause_label(&self) -> &'static str {
        self.root_cause.map(|c| c.as_str()).unwrap_or("")
    }
}

fn as_flag<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*flag))
}

fn cause_or_empty<S: Serializer>(cause: &Option<RootCause>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(cause.map(|c| c.as_str()).unwrap_or(""))
}

/// Counters for one stream, logged on shutdown
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub readings_accepted: u64,
    pub readings_rejected: u64,
    pub windows_scored: u64,
    pub windows_failed: u64,
    pub anomalies: u64,
    pub alert_windows: u64,
    pub root_causes: HashMap<RootCause, u64>,
}

impl StreamStats {
    pub fn merge(&mut self, other: &StreamStats) {
        self.readings_accepted += other.readings_accepted;
        self.readings_rejected += other.readings_rejected;
        self.windows_scored += other.windows_scored;
        self.windows_failed += other.windows_failed;
        self.anomalies += other.anomalies;
        self.alert_windows += other.alert_windows;
        for (cause, count) in &other.root_causes {
            *self.root_causes.entry(*cause).or_insert(0) += count;
        }
    }

    /// Root-cause counts, most frequent first
    pub fn root_cause_summary(&self) -> Vec<(RootCause, u64)> {
        let mut counts: Vec<(RootCause, u64)> =
            self.root_causes.iter().map(|(c, n)| (*c, *n)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        counts
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub window_size: usize,
    pub threshold: f64,
    pub alert_policy: AlertPolicy,
    pub root_cause: RootCauseThresholds,
    /// Emit a status line at most this often; `None` disables status lines
    pub status_interval: Option<Duration>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            window_size: 60,
            threshold: -3.0,
            alert_policy: AlertPolicy::default(),
            root_cause: RootCauseThresholds::default(),
            status_interval: None,
        }
    }
}

/// Owns all mutable state of one logical sensor stream.
///
/// Events must be fed one at a time; one ready window in yields at most one
/// `ScoredRecord` out. Errors never advance the alert state.
pub struct StreamProcessor {
    stream_id: String,
    window: WindowBuffer,
    extractor: FeatureExtractor,
    scorer: Arc<dyn AnomalyScorer>,
    detector: ThresholdDetector,
    alerts: AlertStateMachine,
    classifier: RootCauseClassifier,
    stats: StreamStats,
    status_interval: Option<Duration>,
    last_status: Option<Instant>,
}

impl StreamProcessor {
    pub fn new(
        stream_id: impl Into<String>,
        settings: &ProcessorSettings,
        scorer: Arc<dyn AnomalyScorer>,
    ) -> Result<Self, AlertPolicyError> {
        Ok(Self {
            stream_id: stream_id.into(),
            window: WindowBuffer::new(settings.window_size),
            extractor: FeatureExtractor::new(),
            scorer,
            detector: ThresholdDetector::new(settings.threshold),
            alerts: AlertStateMachine::new(settings.alert_policy)?,
            classifier: RootCauseClassifier::new(settings.root_cause),
            stats: StreamStats::default(),
            status_interval: settings.status_interval,
            last_status: None,
        })
    }

    /// Parse one raw JSONL line and process it; malformed lines are dropped
    pub fn ingest_line(&mut self, line: &str) -> Result<Option<ScoredRecord>, ProcessError> {
        match SensorReading::from_jsonl(line) {
            Ok(reading) => self.process(reading),
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Count and report a reading that failed validation upstream
    pub fn reject(&mut self, err: ReadingError) -> ProcessError {
        self.stats.readings_rejected += 1;
        log::warn!("[{}] dropped reading: {}", self.stream_id, err);
        ProcessError::Rejected(err)
    }

    pub fn process(&mut self, reading: SensorReading) -> Result<Option<ScoredRecord>, ProcessError> {
        let ts = reading.ts();
        self.stats.readings_accepted += 1;
        self.window.add(reading);

        if !self.window.ready() {
            return Ok(None);
        }

        let snapshot = self.window.snapshot();
        let features = self.extractor.extract(&snapshot);
        self.score_window(ts, features).map(Some)
    }

    /// Score an extracted window and advance the alert state.
    ///
    /// On any error the window is dropped and the alert history is untouched.
    pub fn score_window(
        &mut self,
        ts: DateTime<Utc>,
        features: FeatureVector,
    ) -> Result<ScoredRecord, ProcessError> {
        let score = match self.try_score(&features) {
            Ok(score) => score,
            Err(e) => {
                self.stats.windows_failed += 1;
                log::warn!(
                    "[{}] window at {} skipped ({}): {}",
                    self.stream_id,
                    ts.to_rfc3339(),
                    self.scorer.name(),
                    e
                );
                return Err(e);
            }
        };

        let decision = self.detector.decide(score);
        let previous = self.alerts.state();
        let state = self.alerts.update(decision.is_anomaly);
        let alert_active = state.is_active();

        let root_cause = if alert_active {
            Some(self.classifier.classify(&features))
        } else {
            None
        };

        if state != previous {
            match state {
                AlertState::Active => log::info!(
                    "🚨 [{}] alert raised at {} (cause: {})",
                    self.stream_id,
                    ts.to_rfc3339(),
                    root_cause.map(|c| c.as_str()).unwrap_or("unknown")
                ),
                AlertState::Inactive => {
                    log::info!("✅ [{}] alert cleared at {}", self.stream_id, ts.to_rfc3339())
                }
            }
        }

        self.stats.windows_scored += 1;
        if decision.is_anomaly {
            self.stats.anomalies += 1;
        }
        if let Some(cause) = root_cause {
            self.stats.alert_windows += 1;
            *self.stats.root_causes.entry(cause).or_insert(0) += 1;
        }

        let record = ScoredRecord {
            stream_id: self.stream_id.clone(),
            ts,
            features,
            score: decision.score,
            is_anomaly: decision.is_anomaly,
            alert_active,
            root_cause,
        };

        self.report_status(&record);
        Ok(record)
    }

    fn try_score(&self, features: &FeatureVector) -> Result<f64, ProcessError> {
        features.check_contract()?;

        let score = self.scorer.score(features)?;
        if !score.is_finite() {
            return Err(ProcessError::Scorer(ScoreError::NonFinite(score)));
        }
        Ok(score)
    }

    fn report_status(&mut self, record: &ScoredRecord) {
        let Some(interval) = self.status_interval else {
            return;
        };
        if self.last_status.map_or(false, |last| last.elapsed() < interval) {
            return;
        }
        self.last_status = Some(Instant::now());

        let gas_mean = record.features.get("gas_ppm_mean").unwrap_or(f64::NAN);
        if record.alert_active {
            log::info!(
                "[ALERT] {} score={:.3} cause={} gas_mean={:.2}",
                self.stream_id,
                record.score,
                record.root_cause_label(),
                gas_mean
            );
        } else if record.is_anomaly {
            log::info!(
                "[anomaly] {} score={:.3} (not alerted yet) gas_mean={:.2}",
                self.stream_id,
                record.score,
                gas_mean
            );
        } else {
            log::info!("[ok] {} score={:.3} gas_mean={:.2}", self.stream_id, record.score, gas_mean);
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn alert_state(&self) -> AlertState {
        self.alerts.state()
    }

    pub fn alerts(&self) -> &AlertStateMachine {
        &self.alerts
    }

    pub fn window(&self) -> &WindowBuffer {
        &self.window
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}

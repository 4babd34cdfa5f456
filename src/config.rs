//! Pipeline configuration from environment variables
//!
//! Loaded once at startup (after `dotenv`) and turned into per-stream
//! `ProcessorSettings`.

use crate::detection_core::alert::{AlertPolicy, AlertPolicyError};
use crate::detection_core::processor::ProcessorSettings;
use crate::detection_core::root_cause::RootCauseThresholds;
use crate::detection_core::writer::BackendType;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Invalid alert policy: {0}")]
    AlertPolicy(#[from] AlertPolicyError),
}

/// Configuration for the scoring runtime
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Readings per window (W)
    pub window_size: usize,

    /// Windows scoring strictly below this are anomalous
    pub anomaly_threshold: f64,

    pub alert_policy: AlertPolicy,

    pub root_cause: RootCauseThresholds,

    /// Baseline model artifact
    pub model_path: PathBuf,

    /// JSONL input file to tail, or `-` for stdin
    pub input_path: String,

    /// Replay the input file from its start instead of tailing new lines only
    pub replay_input: bool,

    pub backend: BackendType,

    /// JSONL output directory or SQLite database file, depending on backend
    pub output_path: PathBuf,

    /// Stream id for readings without a `sensor_id`
    pub default_stream_id: String,

    /// Seconds between per-stream status lines (0 disables)
    pub status_interval_secs: u64,

    /// Per-stream channel buffer size (readings)
    pub channel_buffer: usize,

    /// Seconds without readings before a stream task is closed (0 keeps streams forever)
    pub stream_idle_secs: u64,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WINDOW_SIZE` (default: 60)
    /// - `ANOMALY_THRESHOLD` (default: -3.0)
    /// - `ALERT_HISTORY_LEN` / `ALERT_ON_COUNT` / `ALERT_OFF_COUNT` (default: 5 / 3 / 0)
    /// - `GAS_SPIKE_THRESH` (30), `GAS_STUCK_THRESH` (0.05),
    ///   `TEMP_DRIFT_THRESH` (0.01), `SMOKE_NOISE_THRESH` (0.05)
    /// - `MODEL_PATH` (default: models/baseline_v1.json)
    /// - `INPUT_PATH` (default: `-`, stdin)
    /// - `REPLAY_INPUT` (default: false)
    /// - `OUTPUT_PATH` (default: data/scored, or data/sensorwatch.db for sqlite)
    /// - `DEFAULT_STREAM_ID` (default: building1)
    /// - `STATUS_INTERVAL_SECS` (default: 10)
    /// - `STREAM_CHANNEL_BUFFER` (default: 1024)
    /// - `STREAM_IDLE_SECS` (default: 3600, 0 disables)
    pub fn from_env(backend: BackendType) -> Self {
        let defaults = RootCauseThresholds::default();
        let default_output = match backend {
            BackendType::Jsonl => "data/scored",
            BackendType::Sqlite => "data/sensorwatch.db",
        };

        Self {
            window_size: env_or("WINDOW_SIZE", 60),
            anomaly_threshold: env_or("ANOMALY_THRESHOLD", -3.0),
            alert_policy: AlertPolicy {
                history_len: env_or("ALERT_HISTORY_LEN", 5),
                on_count: env_or("ALERT_ON_COUNT", 3),
                off_count: env_or("ALERT_OFF_COUNT", 0),
            },
            root_cause: RootCauseThresholds {
                gas_spike: env_or("GAS_SPIKE_THRESH", defaults.gas_spike),
                gas_stuck: env_or("GAS_STUCK_THRESH", defaults.gas_stuck),
                temp_drift: env_or("TEMP_DRIFT_THRESH", defaults.temp_drift),
                smoke_noise: env_or("SMOKE_NOISE_THRESH", defaults.smoke_noise),
            },
            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "models/baseline_v1.json".to_string())
                .into(),
            input_path: env::var("INPUT_PATH").unwrap_or_else(|_| "-".to_string()),
            replay_input: env_or("REPLAY_INPUT", false),
            backend,
            output_path: env::var("OUTPUT_PATH")
                .unwrap_or_else(|_| default_output.to_string())
                .into(),
            default_stream_id: env::var("DEFAULT_STREAM_ID")
                .unwrap_or_else(|_| "building1".to_string()),
            status_interval_secs: env_or("STATUS_INTERVAL_SECS", 10),
            channel_buffer: env_or("STREAM_CHANNEL_BUFFER", 1024),
            stream_idle_secs: env_or("STREAM_IDLE_SECS", 3600),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::InvalidValue(
                "WINDOW_SIZE must be at least 1".to_string(),
            ));
        }

        if !self.anomaly_threshold.is_finite() {
            return Err(ConfigError::InvalidValue(format!(
                "ANOMALY_THRESHOLD must be finite, got {}",
                self.anomaly_threshold
            )));
        }

        if self.default_stream_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_STREAM_ID cannot be empty".to_string(),
            ));
        }

        self.alert_policy.validate()?;
        Ok(())
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_secs > 0).then(|| Duration::from_secs(self.stream_idle_secs))
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            window_size: self.window_size,
            threshold: self.anomaly_threshold,
            alert_policy: self.alert_policy,
            root_cause: self.root_cause,
            status_interval: (self.status_interval_secs > 0)
                .then(|| Duration::from_secs(self.status_interval_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-wide
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 9] = [
        "WINDOW_SIZE",
        "ANOMALY_THRESHOLD",
        "ALERT_ON_COUNT",
        "GAS_SPIKE_THRESH",
        "INPUT_PATH",
        "OUTPUT_PATH",
        "STATUS_INTERVAL_SECS",
        "DEFAULT_STREAM_ID",
        "STREAM_IDLE_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = PipelineConfig::from_env(BackendType::Jsonl);

        assert_eq!(config.window_size, 60);
        assert_eq!(config.anomaly_threshold, -3.0);
        assert_eq!(config.alert_policy, AlertPolicy::default());
        assert_eq!(config.root_cause, RootCauseThresholds::default());
        assert_eq!(config.input_path, "-");
        assert_eq!(config.output_path, PathBuf::from("data/scored"));
        assert_eq!(config.default_stream_id, "building1");
        assert_eq!(config.stream_idle_timeout(), Some(Duration::from_secs(3600)));
        assert!(config.validate().is_ok());

        let sqlite = PipelineConfig::from_env(BackendType::Sqlite);
        assert_eq!(sqlite.output_path, PathBuf::from("data/sensorwatch.db"));
    }

    #[test]
    fn test_custom_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("WINDOW_SIZE", "30");
        env::set_var("ANOMALY_THRESHOLD", "-0.649129");
        env::set_var("GAS_SPIKE_THRESH", "45");
        env::set_var("STATUS_INTERVAL_SECS", "0");
        env::set_var("INPUT_PATH", "streams/building1.jsonl");
        env::set_var("STREAM_IDLE_SECS", "0");

        let config = PipelineConfig::from_env(BackendType::Jsonl);
        let settings = config.processor_settings();

        assert_eq!(settings.window_size, 30);
        assert_eq!(settings.threshold, -0.649129);
        assert_eq!(settings.root_cause.gas_spike, 45.0);
        assert_eq!(settings.status_interval, None);
        assert_eq!(config.input_path, "streams/building1.jsonl");
        assert_eq!(config.stream_idle_timeout(), None);

        clear_env();
    }

    #[test]
    fn test_unparseable_value_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("WINDOW_SIZE", "sixty");

        assert_eq!(PipelineConfig::from_env(BackendType::Jsonl).window_size, 60);

        clear_env();
    }

    #[test]
    fn test_validation_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let mut config = PipelineConfig::from_env(BackendType::Jsonl);
        config.window_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = PipelineConfig::from_env(BackendType::Jsonl);
        config.alert_policy.on_count = 9;
        assert!(matches!(config.validate(), Err(ConfigError::AlertPolicy(_))));

        let mut config = PipelineConfig::from_env(BackendType::Jsonl);
        config.anomaly_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }
}

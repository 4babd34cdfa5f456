//! Synthetic sensor stream for demos and end-to-end runs
//!
//! Produces readings around fixed baselines with Gaussian noise and can
//! inject one of four anomaly patterns during a configurable time window.

use crate::detection_core::reading::{Channel, SensorReading, CHANNEL_COUNT};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::env;
use std::time::Duration;

const BASE_TEMP: f64 = 22.0;
const BASE_HUMIDITY: f64 = 0.45;
const BASE_GAS: f64 = 12.0;
const BASE_SMOKE: f64 = 0.02;
const BASE_BATTERY: f64 = 3.75;
const BATTERY_DECAY_PER_SEC: f64 = 0.00002;
const BATTERY_FLOOR: f64 = 3.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnomalyMode {
    #[default]
    None,
    /// Gas multiplied by 8-15x
    SpikeGas,
    /// Temperature rising 0.03 C per minute of elapsed time
    DriftTemp,
    /// Gas flatlined at its baseline
    StuckGas,
    /// Smoke noise sigma raised to 0.12
    NoisySmoke,
}

impl AnomalyMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(AnomalyMode::None),
            "spike_gas" => Some(AnomalyMode::SpikeGas),
            "drift_temp" => Some(AnomalyMode::DriftTemp),
            "stuck_gas" => Some(AnomalyMode::StuckGas),
            "noisy_smoke" => Some(AnomalyMode::NoisySmoke),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyMode::None => "none",
            AnomalyMode::SpikeGas => "spike_gas",
            AnomalyMode::DriftTemp => "drift_temp",
            AnomalyMode::StuckGas => "stuck_gas",
            AnomalyMode::NoisySmoke => "noisy_smoke",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub sensor_id: String,
    pub location: String,
    pub mode: AnomalyMode,
    pub anomaly_start: Duration,
    pub anomaly_duration: Duration,
    pub publish_every: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sensor_id: "sensor_01".to_string(),
            location: "lab_A".to_string(),
            mode: AnomalyMode::None,
            anomaly_start: Duration::from_secs(90),
            anomaly_duration: Duration::from_secs(40),
            publish_every: Duration::from_millis(1000),
        }
    }
}

impl SimulatorConfig {
    /// Load simulator settings from environment variables
    ///
    /// - `SIM_SENSOR_ID` (default: sensor_01)
    /// - `SIM_LOCATION` (default: lab_A)
    /// - `ANOMALY_MODE` (default: none)
    /// - `ANOMALY_START_AFTER_SEC` (default: 90)
    /// - `ANOMALY_DURATION_SEC` (default: 40)
    /// - `PUBLISH_EVERY_MS` (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mode = match env::var("ANOMALY_MODE") {
            Ok(raw) => AnomalyMode::from_str(&raw).unwrap_or_else(|| {
                log::warn!("⚠️  Unknown ANOMALY_MODE '{}', using none", raw);
                AnomalyMode::None
            }),
            Err(_) => defaults.mode,
        };

        Self {
            sensor_id: env::var("SIM_SENSOR_ID").unwrap_or(defaults.sensor_id),
            location: env::var("SIM_LOCATION").unwrap_or(defaults.location),
            mode,
            anomaly_start: env::var("ANOMALY_START_AFTER_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.anomaly_start),
            anomaly_duration: env::var("ANOMALY_DURATION_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.anomaly_duration),
            publish_every: env::var("PUBLISH_EVERY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_every),
        }
    }
}

pub struct SensorSimulator<R: Rng> {
    config: SimulatorConfig,
    rng: R,
}

impl SensorSimulator<rand::rngs::ThreadRng> {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_rng(config, rand::thread_rng())
    }
}

impl<R: Rng> SensorSimulator<R> {
    pub fn with_rng(config: SimulatorConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Whether the anomaly is injected `elapsed` into the run (both ends inclusive)
    pub fn anomaly_active(&self, elapsed: Duration) -> bool {
        self.config.mode != AnomalyMode::None
            && elapsed >= self.config.anomaly_start
            && elapsed <= self.config.anomaly_start + self.config.anomaly_duration
    }

    /// One reading `elapsed` into the run, stamped with `ts`
    pub fn reading_at(&mut self, elapsed: Duration, ts: DateTime<Utc>) -> SensorReading {
        let t = elapsed.as_secs_f64();

        let mut temp = BASE_TEMP + self.gauss(0.2);
        let humidity = (BASE_HUMIDITY + self.gauss(0.02)).clamp(0.0, 1.0);
        let mut gas = (BASE_GAS + self.gauss(0.8)).max(0.0);
        let mut smoke = (BASE_SMOKE + self.gauss(0.01)).max(0.0);
        let battery = (BASE_BATTERY - BATTERY_DECAY_PER_SEC * t + self.gauss(0.005)).max(BATTERY_FLOOR);

        if self.anomaly_active(elapsed) {
            let mode = self.config.mode;
            match mode {
                AnomalyMode::SpikeGas => gas *= self.rng.gen_range(8.0..15.0),
                AnomalyMode::DriftTemp => temp += 0.03 * t / 60.0,
                AnomalyMode::StuckGas => gas = BASE_GAS,
                AnomalyMode::NoisySmoke => smoke = (BASE_SMOKE + self.gauss(0.12)).max(0.0),
                AnomalyMode::None => {}
            }
        }

        let mut values = [0.0; CHANNEL_COUNT];
        values[Channel::TempC.index()] = round3(temp);
        values[Channel::Humidity.index()] = round3(humidity);
        values[Channel::GasPpm.index()] = round3(gas);
        values[Channel::Smoke.index()] = round3(smoke);
        values[Channel::BatteryV.index()] = round3(battery);

        SensorReading::new(ts, values)
            .with_sensor_id(self.config.sensor_id.clone())
            .with_location(self.config.location.clone())
    }

    fn gauss(&mut self, sigma: f64) -> f64 {
        Normal::new(0.0, sigma)
            .map(|normal| normal.sample(&mut self.rng))
            .unwrap_or(0.0)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection_core::features::FeatureExtractor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn simulator(mode: AnomalyMode) -> SensorSimulator<StdRng> {
        let config = SimulatorConfig {
            mode,
            anomaly_start: Duration::from_secs(10),
            anomaly_duration: Duration::from_secs(20),
            ..SimulatorConfig::default()
        };
        SensorSimulator::with_rng(config, StdRng::seed_from_u64(7))
    }

    fn run(sim: &mut SensorSimulator<StdRng>, from_sec: u64, to_sec: u64) -> Vec<SensorReading> {
        (from_sec..to_sec)
            .map(|s| sim.reading_at(Duration::from_secs(s), Utc::now()))
            .collect()
    }

    #[test]
    fn test_anomaly_mode_from_str() {
        assert_eq!(AnomalyMode::from_str("spike_gas"), Some(AnomalyMode::SpikeGas));
        assert_eq!(AnomalyMode::from_str(" Noisy_Smoke "), Some(AnomalyMode::NoisySmoke));
        assert_eq!(AnomalyMode::from_str("none"), Some(AnomalyMode::None));
        assert_eq!(AnomalyMode::from_str("fire"), None);
        assert_eq!(AnomalyMode::StuckGas.as_str(), "stuck_gas");
    }

    #[test]
    fn test_anomaly_window_is_inclusive() {
        let sim = simulator(AnomalyMode::StuckGas);
        assert!(!sim.anomaly_active(Duration::from_secs(9)));
        assert!(sim.anomaly_active(Duration::from_secs(10)));
        assert!(sim.anomaly_active(Duration::from_secs(30)));
        assert!(!sim.anomaly_active(Duration::from_secs(31)));

        assert!(!simulator(AnomalyMode::None).anomaly_active(Duration::from_secs(15)));
    }

    #[test]
    fn test_normal_readings_stay_in_range() {
        let mut sim = simulator(AnomalyMode::None);
        for reading in run(&mut sim, 0, 200) {
            assert!((0.0..=1.0).contains(&reading.value(Channel::Humidity)));
            assert!(reading.value(Channel::GasPpm) >= 0.0);
            assert!(reading.value(Channel::Smoke) >= 0.0);
            assert!(reading.value(Channel::BatteryV) >= BATTERY_FLOOR);
            assert!((reading.value(Channel::TempC) - BASE_TEMP).abs() < 2.0);
            assert_eq!(reading.sensor_id(), Some("sensor_01"));
            assert_eq!(reading.location(), Some("lab_A"));
        }
    }

    #[test]
    fn test_stuck_gas_flatlines() {
        let mut sim = simulator(AnomalyMode::StuckGas);
        let window = run(&mut sim, 10, 30);
        assert!(window.iter().all(|r| r.value(Channel::GasPpm) == BASE_GAS));

        let features = FeatureExtractor::new().extract(&window);
        assert_eq!(features.get("gas_ppm_std"), Some(0.0));
    }

    #[test]
    fn test_spike_gas_raises_mean() {
        let mut sim = simulator(AnomalyMode::SpikeGas);
        let window = run(&mut sim, 10, 30);

        let features = FeatureExtractor::new().extract(&window);
        assert!(features.get("gas_ppm_mean").unwrap() > 30.0);
    }

    #[test]
    fn test_readings_encode_to_wire_format() {
        let mut sim = simulator(AnomalyMode::None);
        let reading = sim.reading_at(Duration::from_secs(1), Utc::now());

        let line = reading.to_jsonl().unwrap();
        assert!(line.contains(r#""sensor_id":"sensor_01""#));

        let parsed = SensorReading::from_jsonl(&line).unwrap();
        assert_eq!(parsed, reading);
    }
}

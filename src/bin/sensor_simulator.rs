//! Sensor Simulator Binary - Synthetic Reading Stream
//!
//! Emits one JSONL reading per tick to stdout or appends to a file, with an
//! optional anomaly injected after a delay.
//!
//! ## Usage
//!
//! ```bash
//! ANOMALY_MODE=spike_gas cargo run --release --bin sensor_simulator
//! ```
//!
//! ## Environment Variables
//!
//! - SIM_SENSOR_ID - sensor_id field (default: sensor_01)
//! - SIM_LOCATION - location field (default: lab_A)
//! - ANOMALY_MODE - none, spike_gas, drift_temp, stuck_gas, noisy_smoke (default: none)
//! - ANOMALY_START_AFTER_SEC - Seconds before the anomaly starts (default: 90)
//! - ANOMALY_DURATION_SEC - Anomaly length in seconds (default: 40)
//! - PUBLISH_EVERY_MS - Interval between readings (default: 1000)
//! - SIM_OUTPUT_PATH - JSONL file to append to (default: stdout)
//! - RUST_LOG - Logging level (optional, default: info)

use chrono::Utc;
use sensorwatch::detection_core::Channel;
use sensorwatch::simulator::{SensorSimulator, SimulatorConfig};
use std::env;
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::interval;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = SimulatorConfig::from_env();
    let output_path = env::var("SIM_OUTPUT_PATH").ok();

    log::info!("🚀 Starting Sensor Simulator");
    log::info!("   Sensor: {} @ {}", config.sensor_id, config.location);
    log::info!(
        "   Anomaly: {} after {}s for {}s",
        config.mode.as_str(),
        config.anomaly_start.as_secs(),
        config.anomaly_duration.as_secs()
    );
    log::info!("   Output: {}", output_path.as_deref().unwrap_or("stdout"));

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &output_path {
        Some(path) => {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            Box::new(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?,
            )
        }
        None => Box::new(tokio::io::stdout()),
    };

    let mut ticker = interval(config.publish_every);
    let mut simulator = SensorSimulator::new(config);
    let start = Instant::now();
    let mut last_report = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed = start.elapsed();
                let reading = simulator.reading_at(elapsed, Utc::now());

                let mut line = reading.to_jsonl()?;
                line.push('\n');
                out.write_all(line.as_bytes()).await?;
                out.flush().await?;

                let secs = elapsed.as_secs();
                if secs % 5 == 0 && last_report != Some(secs) {
                    last_report = Some(secs);
                    let mode = if simulator.anomaly_active(elapsed) {
                        simulator.config().mode.as_str()
                    } else {
                        "none"
                    };
                    log::info!(
                        "[t={}s] published (anomaly={}): gas_ppm={} temp_c={}",
                        secs,
                        mode,
                        reading.value(Channel::GasPpm),
                        reading.value(Channel::TempC)
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                log::info!("🛑 Simulator stopped");
                break;
            }
        }
    }

    out.flush().await?;
    Ok(())
}

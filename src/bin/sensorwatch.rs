//! Sensorwatch Binary - Streaming Sensor Anomaly Detection
//!
//! Reads sensor readings as JSONL (a tailed file or stdin), scores sliding
//! windows per stream and writes scored records with alert state and root
//! cause.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin sensor_simulator | cargo run --release --bin sensorwatch
//! INPUT_PATH=streams/building1.jsonl cargo run --release --bin sensorwatch -- --backend sqlite
//! ```
//!
//! ## Environment Variables
//!
//! - INPUT_PATH - JSONL file to tail, `-` for stdin (default: -)
//! - REPLAY_INPUT - Read the input file from its start (default: false)
//! - MODEL_PATH - Baseline model artifact (default: models/baseline_v1.json)
//! - OUTPUT_PATH - Output directory (JSONL) or database file (SQLite)
//! - WINDOW_SIZE - Readings per window (default: 60)
//! - ANOMALY_THRESHOLD - Scores below this are anomalous (default: -3.0)
//! - ALERT_HISTORY_LEN / ALERT_ON_COUNT / ALERT_OFF_COUNT - Alert debounce (default: 5 / 3 / 0)
//! - GAS_SPIKE_THRESH / GAS_STUCK_THRESH / TEMP_DRIFT_THRESH / SMOKE_NOISE_THRESH - Root-cause rules
//! - DEFAULT_STREAM_ID - Stream for readings without sensor_id (default: building1)
//! - STATUS_INTERVAL_SECS - Seconds between status lines, 0 disables (default: 10)
//! - STREAM_IDLE_SECS - Close a stream after this long without readings, 0 disables (default: 3600)
//! - RUST_LOG - Logging level (optional, default: info)

use sensorwatch::config::PipelineConfig;
use sensorwatch::detection_core::{
    router::spawn_writer, AnomalyScorer, BackendType, BaselineScorer, LineSource, RecordWriter,
    StreamRouter,
};
use std::env;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let config = PipelineConfig::from_env(BackendType::from_args(&args));
    config.validate()?;

    log::info!("🚀 Starting Sensorwatch");
    log::info!("   Input: {}", config.input_path);
    log::info!("   Model: {}", config.model_path.display());
    log::info!("   Output: {}", config.output_path.display());
    log::info!("   Window size: {}", config.window_size);
    log::info!("   Anomaly threshold: {}", config.anomaly_threshold);
    log::info!(
        "   Alert policy: {} of last {} on, {} off",
        config.alert_policy.on_count,
        config.alert_policy.history_len,
        config.alert_policy.off_count
    );

    let scorer: Arc<dyn AnomalyScorer> = Arc::new(BaselineScorer::from_file(&config.model_path)?);

    let writer = RecordWriter::new(config.backend, config.output_path.clone())?;
    let (records_tx, records_rx) = mpsc::channel(config.channel_buffer);
    let writer_task = spawn_writer(writer, records_rx);

    let mut router = StreamRouter::new(
        config.processor_settings(),
        scorer,
        config.default_stream_id.clone(),
        config.channel_buffer,
        records_tx,
    )?;
    if let Some(timeout) = config.stream_idle_timeout() {
        router = router.with_idle_timeout(timeout);
        log::info!("   Stream idle timeout: {}s", timeout.as_secs());
    }

    let mut source = LineSource::open(&config.input_path, config.replay_input).await?;

    log::info!("✅ Sensorwatch running - processing readings...");

    loop {
        tokio::select! {
            line = source.next_line() => {
                match line {
                    Ok(Some(line)) => router.dispatch_line(&line).await?,
                    Ok(None) => {
                        log::info!("📭 Input closed");
                        break;
                    }
                    Err(e) => {
                        log::error!("Input stream error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                log::info!("🛑 Shutdown requested");
                break;
            }
        }
    }

    let streams = router.stream_count();
    let stats = router.shutdown().await;
    let written = writer_task.await?;

    log::info!("📊 Summary across {} stream(s):", streams);
    log::info!(
        "   Readings: {} accepted, {} rejected",
        stats.readings_accepted,
        stats.readings_rejected
    );
    log::info!(
        "   Windows: {} scored, {} failed, {} written",
        stats.windows_scored,
        stats.windows_failed,
        written
    );
    log::info!(
        "   Anomalies: {}, alert windows: {}",
        stats.anomalies,
        stats.alert_windows
    );
    for (cause, count) in stats.root_cause_summary() {
        log::info!("   {:<12} {}", cause.as_str(), count);
    }

    Ok(())
}

//! Fan-out of raw readings to one processor task per logical stream
//!
//! Each stream id gets its own tokio task that exclusively owns a
//! `StreamProcessor`, fed through a bounded channel so readings of one
//! stream are processed strictly in arrival order. Scored records from all
//! streams are forwarded to a single writer task.
//!
//! With an idle timeout set, a stream that receives nothing for that long
//! closes its task. Its stats are kept and the next reading for that id
//! starts a fresh processor with an empty window and alert history.

use super::alert::AlertPolicyError;
use super::processor::{ProcessorSettings, ScoredRecord, StreamProcessor, StreamStats};
use super::reading::SensorReading;
use super::scorer::AnomalyScorer;
use super::writer_backend::RecordSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid alert policy: {0}")]
    Policy(#[from] AlertPolicyError),
    #[error("stream task for '{0}' has stopped")]
    StreamClosed(String),
}

struct StreamHandle {
    tx: mpsc::Sender<SensorReading>,
    task: JoinHandle<StreamStats>,
}

pub struct StreamRouter {
    settings: ProcessorSettings,
    scorer: Arc<dyn AnomalyScorer>,
    default_stream: String,
    channel_buffer: usize,
    records_tx: mpsc::Sender<ScoredRecord>,
    streams: HashMap<String, StreamHandle>,
    idle_timeout: Option<Duration>,
    /// Stats of stream tasks that closed while idle
    retired: StreamStats,
    rejected: u64,
}

impl StreamRouter {
    pub fn new(
        settings: ProcessorSettings,
        scorer: Arc<dyn AnomalyScorer>,
        default_stream: impl Into<String>,
        channel_buffer: usize,
        records_tx: mpsc::Sender<ScoredRecord>,
    ) -> Result<Self, RouterError> {
        settings.alert_policy.validate()?;

        Ok(Self {
            settings,
            scorer,
            default_stream: default_stream.into(),
            channel_buffer: channel_buffer.max(1),
            records_tx,
            streams: HashMap::new(),
            idle_timeout: None,
            retired: StreamStats::default(),
            rejected: 0,
        })
    }

    /// Close stream tasks that receive no reading for `timeout`
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Validate one raw line and hand it to its stream's task.
    ///
    /// Invalid lines are logged and dropped; they never reach a window.
    pub async fn dispatch_line(&mut self, line: &str) -> Result<(), RouterError> {
        match SensorReading::from_jsonl(line) {
            Ok(reading) => self.dispatch(reading).await,
            Err(e) => {
                self.rejected += 1;
                log::warn!("[{}] dropped reading: {}", self.default_stream, e);
                Ok(())
            }
        }
    }

    pub async fn dispatch(&mut self, reading: SensorReading) -> Result<(), RouterError> {
        let stream_id = reading.stream_key(&self.default_stream).to_string();

        if !self.streams.contains_key(&stream_id) {
            self.reap_idle().await;
            let handle = self.spawn_stream(&stream_id)?;
            self.streams.insert(stream_id.clone(), handle);
        }

        let Some(handle) = self.streams.get(&stream_id) else {
            return Err(RouterError::StreamClosed(stream_id));
        };
        let reading = match handle.tx.send(reading).await {
            Ok(()) => return Ok(()),
            Err(mpsc::error::SendError(reading)) => reading,
        };

        // The task closed on idle between readings; restart it
        if let Some(handle) = self.streams.remove(&stream_id) {
            self.retire(&stream_id, handle).await;
        }
        let handle = self.spawn_stream(&stream_id)?;
        let result = handle.tx.send(reading).await;
        self.streams.insert(stream_id.clone(), handle);
        result.map_err(|_| RouterError::StreamClosed(stream_id))
    }

    /// Drop handles of stream tasks that have already exited
    async fn reap_idle(&mut self) {
        let finished: Vec<String> = self
            .streams
            .iter()
            .filter(|(_, handle)| handle.task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for stream_id in finished {
            if let Some(handle) = self.streams.remove(&stream_id) {
                self.retire(&stream_id, handle).await;
            }
        }
    }

    async fn retire(&mut self, stream_id: &str, handle: StreamHandle) {
        drop(handle.tx);
        match handle.task.await {
            Ok(stats) => self.retired.merge(&stats),
            Err(e) => log::error!("[{}] stream task failed: {}", stream_id, e),
        }
    }

    fn spawn_stream(&self, stream_id: &str) -> Result<StreamHandle, RouterError> {
        let processor = StreamProcessor::new(stream_id, &self.settings, Arc::clone(&self.scorer))?;
        let (tx, rx) = mpsc::channel(self.channel_buffer);
        let task = tokio::spawn(run_stream(
            processor,
            rx,
            self.records_tx.clone(),
            self.idle_timeout,
        ));

        log::info!("🆕 Started stream {}", stream_id);
        Ok(StreamHandle { tx, task })
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Close every stream, wait for queued readings to finish and merge stats
    pub async fn shutdown(self) -> StreamStats {
        let mut total = self.retired;
        total.readings_rejected += self.rejected;

        for (stream_id, handle) in self.streams {
            drop(handle.tx);
            match handle.task.await {
                Ok(stats) => {
                    log::info!(
                        "📊 [{}] {} windows, {} anomalies, {} alert windows",
                        stream_id,
                        stats.windows_scored,
                        stats.anomalies,
                        stats.alert_windows
                    );
                    total.merge(&stats);
                }
                Err(e) => log::error!("[{}] stream task failed: {}", stream_id, e),
            }
        }

        total
    }
}

async fn run_stream(
    mut processor: StreamProcessor,
    mut rx: mpsc::Receiver<SensorReading>,
    records_tx: mpsc::Sender<ScoredRecord>,
    idle_timeout: Option<Duration>,
) -> StreamStats {
    loop {
        let next = match idle_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    log::info!(
                        "💤 [{}] idle for {}s, closing stream",
                        processor.stream_id(),
                        timeout.as_secs()
                    );
                    // Readings already queued are still processed
                    rx.close();
                    continue;
                }
            },
            None => rx.recv().await,
        };
        let Some(reading) = next else {
            break;
        };

        // Errors are logged by the processor and only drop the current window
        if let Ok(Some(record)) = processor.process(reading) {
            if records_tx.send(record).await.is_err() {
                log::error!("[{}] record writer has stopped", processor.stream_id());
                break;
            }
        }
    }

    processor.stats().clone()
}

/// Drain scored records into a sink until every sender is dropped.
///
/// Sink failures are logged per record; the task keeps draining.
pub fn spawn_writer<S>(mut sink: S, mut rx: mpsc::Receiver<ScoredRecord>) -> JoinHandle<u64>
where
    S: RecordSink + 'static,
{
    tokio::spawn(async move {
        log::info!("📊 Backend: {}", sink.backend_type());
        let mut written = 0u64;

        while let Some(record) = rx.recv().await {
            match sink.write_record(&record).await {
                Ok(()) => written += 1,
                Err(e) => log::error!(
                    "[{}] failed to write record at {}: {}",
                    record.stream_id,
                    record.ts.to_rfc3339(),
                    e
                ),
            }
        }

        if let Err(e) = sink.flush().await {
            log::error!("Failed to flush {} sink: {}", sink.backend_type(), e);
        }
        written
    })
}

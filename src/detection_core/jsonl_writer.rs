//! JSONL writer for scored records - one file per stream

use super::processor::ScoredRecord;
use super::writer_backend::{RecordSink, SinkError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub struct JsonlRecordWriter {
    base_path: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
    last_flush: Instant,
    flush_interval: Duration,
}

impl JsonlRecordWriter {
    pub fn new(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        log::info!("📝 Writing scored records under: {}", base_path.display());

        Ok(Self {
            base_path,
            writers: HashMap::new(),
            last_flush: Instant::now(),
            flush_interval: Duration::from_secs(5),
        })
    }

    /// Path of the output file for a stream
    ///
    /// Ids made only of `[A-Za-z0-9_-]` are used as-is. Any other id is
    /// sanitized and suffixed with `.<hex of the raw id>`; plain ids never
    /// contain `.`, so distinct ids always get distinct files.
    pub fn stream_path(&self, stream_id: &str) -> PathBuf {
        let is_plain = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';

        let file_stem = if !stream_id.is_empty() && stream_id.chars().all(is_plain) {
            stream_id.to_string()
        } else {
            let sanitized: String = stream_id
                .chars()
                .map(|c| if is_plain(c) { c } else { '_' })
                .collect();
            format!("{}.{}", sanitized, hex::encode(stream_id.as_bytes()))
        };
        self.base_path.join(format!("{}.jsonl", file_stem))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn write_record(&mut self, record: &ScoredRecord) -> Result<(), SinkError> {
        if !self.writers.contains_key(&record.stream_id) {
            let file_path = self.stream_path(&record.stream_id);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_path)?;

            log::info!("📝 [{}] appending to {}", record.stream_id, file_path.display());
            self.writers.insert(record.stream_id.clone(), BufWriter::new(file));
        }

        let json = serde_json::to_string(record)?;
        if let Some(writer) = self.writers.get_mut(&record.stream_id) {
            writeln!(writer, "{}", json)?;
        }

        if self.last_flush.elapsed() > self.flush_interval {
            self.flush()?;
            self.last_flush = Instant::now();
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for JsonlRecordWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[async_trait]
impl RecordSink for JsonlRecordWriter {
    async fn write_record(&mut self, record: &ScoredRecord) -> Result<(), SinkError> {
        JsonlRecordWriter::write_record(self, record)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        JsonlRecordWriter::flush(self)
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

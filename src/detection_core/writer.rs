//! Unified writer interface for scored records
//!
//! Routes writes to either JSONL or SQLite backend based on configuration.

use super::jsonl_writer::JsonlRecordWriter;
use super::processor::ScoredRecord;
use super::sqlite_writer::SqliteRecordWriter;
use super::writer_backend::{RecordSink, SinkError};
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Jsonl,
    Sqlite,
}

impl BackendType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jsonl" => Some(BackendType::Jsonl),
            "sqlite" => Some(BackendType::Sqlite),
            _ => None,
        }
    }

    /// `--backend <jsonl|sqlite>` from the command line, JSONL by default
    pub fn from_args(args: &[String]) -> Self {
        args.iter()
            .position(|a| a == "--backend")
            .and_then(|idx| args.get(idx + 1))
            .and_then(|value| BackendType::from_str(value))
            .unwrap_or(BackendType::Jsonl)
    }
}

/// Unified writer that routes to either JSONL or SQLite backend
pub enum RecordWriter {
    Jsonl(JsonlRecordWriter),
    Sqlite(SqliteRecordWriter),
}

impl RecordWriter {
    /// Create a new record writer based on backend type
    ///
    /// `output_path` is a directory for JSONL and a database file for SQLite.
    pub fn new(backend: BackendType, output_path: PathBuf) -> Result<Self, SinkError> {
        match backend {
            BackendType::Jsonl => Ok(RecordWriter::Jsonl(JsonlRecordWriter::new(output_path)?)),
            BackendType::Sqlite => Ok(RecordWriter::Sqlite(SqliteRecordWriter::new(output_path)?)),
        }
    }

    /// Write a scored record to the configured backend
    pub async fn write_record(&mut self, record: &ScoredRecord) -> Result<(), SinkError> {
        match self {
            RecordWriter::Jsonl(w) => w.write_record(record),
            RecordWriter::Sqlite(w) => RecordSink::write_record(w, record).await,
        }
    }

    /// Flush pending writes to storage
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        match self {
            RecordWriter::Jsonl(w) => w.flush(),
            RecordWriter::Sqlite(w) => RecordSink::flush(w).await,
        }
    }

    /// Get backend type for logging
    pub fn backend_type(&self) -> &'static str {
        match self {
            RecordWriter::Jsonl(_) => "JSONL",
            RecordWriter::Sqlite(_) => "SQLite",
        }
    }
}

#[async_trait]
impl RecordSink for RecordWriter {
    async fn write_record(&mut self, record: &ScoredRecord) -> Result<(), SinkError> {
        RecordWriter::write_record(self, record).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        RecordWriter::flush(self).await
    }

    fn backend_type(&self) -> &'static str {
        RecordWriter::backend_type(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_backend_from_args() {
        assert_eq!(BackendType::from_args(&args(&["sensorwatch"])), BackendType::Jsonl);
        assert_eq!(
            BackendType::from_args(&args(&["sensorwatch", "--backend", "sqlite"])),
            BackendType::Sqlite
        );
        assert_eq!(
            BackendType::from_args(&args(&["sensorwatch", "--backend", "parquet"])),
            BackendType::Jsonl
        );
        assert_eq!(BackendType::from_args(&args(&["sensorwatch", "--backend"])), BackendType::Jsonl);
    }

    #[test]
    fn test_writer_routes_to_backend() {
        let dir = tempfile::tempdir().unwrap();

        let jsonl = RecordWriter::new(BackendType::Jsonl, dir.path().join("scored")).unwrap();
        assert_eq!(jsonl.backend_type(), "JSONL");

        let sqlite = RecordWriter::new(BackendType::Sqlite, dir.path().join("db/sensorwatch.db")).unwrap();
        assert_eq!(sqlite.backend_type(), "SQLite");
        assert!(dir.path().join("db/sensorwatch.db").exists());
    }
}

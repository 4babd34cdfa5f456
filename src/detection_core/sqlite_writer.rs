//! SQLite writer for scored records
//!
//! Columns follow the output record order: stream id, timestamp, the
//! canonical features, score, flags, root cause.

use super::features::FEATURE_NAMES;
use super::processor::ScoredRecord;
use super::writer_backend::{RecordSink, SinkError};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::time::Instant;

pub struct SqliteRecordWriter {
    conn: Connection,
    insert_sql: String,
    batch: Vec<ScoredRecord>,
    batch_size: usize,
    last_flush: Instant,
    flush_interval_secs: u64,
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        log::warn!("SQLite journal_mode is {}, expected WAL", mode);
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    let _: i64 = conn.pragma_update_and_check(None, "wal_autocheckpoint", 1000, |row| row.get(0))?;
    Ok(())
}

fn create_table_sql() -> String {
    let feature_columns: Vec<String> = FEATURE_NAMES
        .iter()
        .map(|name| format!("{} REAL NOT NULL", name))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS scored_windows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stream_id TEXT NOT NULL,
            ts TEXT NOT NULL,
            {},
            score REAL NOT NULL,
            is_anomaly INTEGER NOT NULL,
            alert_active INTEGER NOT NULL,
            root_cause TEXT NOT NULL
        )",
        feature_columns.join(",\n            ")
    )
}

fn insert_sql() -> String {
    let mut columns = vec!["stream_id", "ts"];
    columns.extend(FEATURE_NAMES);
    columns.extend(["score", "is_anomaly", "alert_active", "root_cause"]);

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO scored_windows ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn row_values(record: &ScoredRecord) -> Vec<Value> {
    let mut values = Vec::with_capacity(FEATURE_NAMES.len() + 6);
    values.push(Value::Text(record.stream_id.clone()));
    values.push(Value::Text(record.ts.to_rfc3339()));
    for name in FEATURE_NAMES {
        values.push(Value::Real(record.features.get(name).unwrap_or(f64::NAN)));
    }
    values.push(Value::Real(record.score));
    values.push(Value::Integer(i64::from(record.is_anomaly)));
    values.push(Value::Integer(i64::from(record.alert_active)));
    values.push(Value::Text(record.root_cause_label().to_string()));
    values
}

impl SqliteRecordWriter {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;

        conn.execute(&create_table_sql(), [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stream_ts ON scored_windows(stream_id, ts DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_alert ON scored_windows(alert_active, ts DESC)",
            [],
        )?;

        log::info!("✅ SQLite record writer initialized with WAL mode");

        Ok(Self {
            conn,
            insert_sql: insert_sql(),
            batch: Vec::with_capacity(100),
            batch_size: 100,
            last_flush: Instant::now(),
            flush_interval_secs: 2,
        })
    }

    fn flush_batch(&mut self) -> Result<(), SinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&self.insert_sql)?;
            for record in &self.batch {
                stmt.execute(params_from_iter(row_values(record)))?;
            }
        }
        tx.commit()?;

        log::debug!("✅ Flushed {} scored windows to SQLite", self.batch.len());
        self.batch.clear();
        self.last_flush = Instant::now();

        Ok(())
    }
}

#[async_trait]
impl RecordSink for SqliteRecordWriter {
    async fn write_record(&mut self, record: &ScoredRecord) -> Result<(), SinkError> {
        self.batch.push(record.clone());

        // Auto-flush if batch full or time elapsed
        if self.batch.len() >= self.batch_size
            || self.last_flush.elapsed().as_secs() >= self.flush_interval_secs
        {
            self.flush_batch()?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.flush_batch()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

impl Drop for SqliteRecordWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush_batch() {
            log::error!("Failed to flush scored windows on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection_core::features::FeatureVector;
    use crate::detection_core::root_cause::RootCause;
    use chrono::{TimeZone, Utc};
    use rusqlite::params;
    use tempfile::tempdir;

    fn create_test_record(stream_id: &str, seq: i64, alert_active: bool) -> ScoredRecord {
        let mut features = FeatureVector::new();
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            features.insert(*name, i as f64 * 0.5);
        }
        ScoredRecord {
            stream_id: stream_id.to_string(),
            ts: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
            features,
            score: -0.82,
            is_anomaly: alert_active,
            alert_active,
            root_cause: alert_active.then_some(RootCause::TempDrift),
        }
    }

    #[tokio::test]
    async fn test_sqlite_record_write() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteRecordWriter::new(&db_path).unwrap();

        writer.write_record(&create_test_record("sensor_01", 0, true)).await.unwrap();
        writer.flush().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let (gas_mean, score, is_anomaly, alert_active, root_cause): (f64, f64, i64, i64, String) = conn
            .query_row(
                "SELECT gas_ppm_mean, score, is_anomaly, alert_active, root_cause FROM scored_windows WHERE stream_id = ?1",
                params!["sensor_01"],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();

        assert_eq!(gas_mean, 6.0);
        assert_eq!(score, -0.82);
        assert_eq!(is_anomaly, 1);
        assert_eq!(alert_active, 1);
        assert_eq!(root_cause, "temp_drift");
    }

    #[tokio::test]
    async fn test_inactive_alert_has_empty_root_cause() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteRecordWriter::new(&db_path).unwrap();

        writer.write_record(&create_test_record("sensor_01", 0, false)).await.unwrap();
        writer.flush().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let root_cause: String = conn
            .query_row("SELECT root_cause FROM scored_windows", [], |row| row.get(0))
            .unwrap();
        assert_eq!(root_cause, "");
    }

    #[tokio::test]
    async fn test_batch_flush() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteRecordWriter::new(&db_path).unwrap();

        // 150 records: one auto-flush at 100
        for seq in 0..150 {
            writer.write_record(&create_test_record("sensor_01", seq, false)).await.unwrap();
        }
        writer.flush().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scored_windows", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 150);
    }

    #[test]
    fn test_columns_follow_record_order() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let _writer = SqliteRecordWriter::new(&db_path).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let mut stmt = conn.prepare("SELECT * FROM scored_windows").unwrap();
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        assert_eq!(columns[0], "id");
        assert_eq!(columns[1], "stream_id");
        assert_eq!(columns[2], "ts");
        assert_eq!(&columns[3..33], &FEATURE_NAMES.map(String::from)[..]);
        assert_eq!(&columns[33..], &["score", "is_anomaly", "alert_active", "root_cause"]);
    }

    #[test]
    fn test_wal_mode_configured() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let _writer = SqliteRecordWriter::new(&db_path).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }
}

//! Detection Core - Per-Stream Sensor Anomaly Pipeline
//!
//! This module turns a stream of validated sensor readings into scored,
//! debounced alert records. Every logical stream owns one `StreamProcessor`;
//! nothing in here is shared mutably between streams.
//!
//! # Architecture
//!
//! ```text
//! JSONL line → SensorReading (validated, else dropped)
//!     ↓
//! WindowBuffer (last W readings, FIFO)
//!     ↓ ready
//! FeatureExtractor (5 channels × mean/std/min/max/slope/delta)
//!     ↓
//! AnomalyScorer (injected capability, lower = more anomalous)
//!     ↓
//! ThresholdDetector → AlertStateMachine (hysteresis)
//!     ↓ alert active
//! RootCauseClassifier (ordered rules, first match wins)
//!     ↓
//! ScoredRecord → RecordWriter → JSONL or SQLite backend
//! ```

pub mod alert;
pub mod detector;
pub mod features;
pub mod jsonl_writer;
pub mod processor;
pub mod reader;
pub mod reading;
pub mod root_cause;
pub mod router;
pub mod scorer;
pub mod sqlite_writer;
pub mod window;
pub mod writer;
pub mod writer_backend;

pub use alert::{AlertHistory, AlertPolicy, AlertState, AlertStateMachine};
pub use detector::{AnomalyDecision, ThresholdDetector};
pub use features::{FeatureContractError, FeatureExtractor, FeatureVector, Statistic, FEATURE_NAMES};
pub use jsonl_writer::JsonlRecordWriter;
pub use processor::{ProcessError, ProcessorSettings, ScoredRecord, StreamProcessor, StreamStats};
pub use reader::{LineSource, TailReader};
pub use reading::{Channel, ReadingError, SensorReading};
pub use root_cause::{RootCause, RootCauseClassifier, RootCauseRule, RootCauseThresholds};
pub use router::StreamRouter;
pub use scorer::{AnomalyScorer, BaselineScorer, ConstantScorer, ScoreError};
pub use sqlite_writer::SqliteRecordWriter;
pub use window::WindowBuffer;
pub use writer::{BackendType, RecordWriter};
pub use writer_backend::{RecordSink, SinkError};

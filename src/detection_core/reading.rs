//! Sensor reading normalization from JSONL events to a validated SensorReading

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monitored sensor channels, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "temp_c")]
    TempC,
    #[serde(rename = "humidity")]
    Humidity,
    #[serde(rename = "gas_ppm")]
    GasPpm,
    #[serde(rename = "smoke")]
    Smoke,
    #[serde(rename = "battery_v")]
    BatteryV,
}

pub const CHANNEL_COUNT: usize = 5;

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::TempC,
        Channel::Humidity,
        Channel::GasPpm,
        Channel::Smoke,
        Channel::BatteryV,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::TempC => "temp_c",
            Channel::Humidity => "humidity",
            Channel::GasPpm => "gas_ppm",
            Channel::Smoke => "smoke",
            Channel::BatteryV => "battery_v",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Channel::TempC => 0,
            Channel::Humidity => 1,
            Channel::GasPpm => 2,
            Channel::Smoke => 3,
            Channel::BatteryV => 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("malformed reading: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("non-finite value for {0}")]
    NonFinite(&'static str),
}

/// Wire shape of a reading; every field optional so missing keys can be named
#[derive(Debug, Deserialize)]
struct RawReading {
    ts: Option<DateTime<Utc>>,
    sensor_id: Option<String>,
    location: Option<String>,
    temp_c: Option<f64>,
    humidity: Option<f64>,
    gas_ppm: Option<f64>,
    smoke: Option<f64>,
    battery_v: Option<f64>,
}

#[derive(Serialize)]
struct WireReading<'a> {
    ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensor_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    temp_c: f64,
    humidity: f64,
    gas_ppm: f64,
    smoke: f64,
    battery_v: f64,
}

/// One validated reading. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    ts: DateTime<Utc>,
    sensor_id: Option<String>,
    location: Option<String>,
    values: [f64; CHANNEL_COUNT],
}

impl SensorReading {
    pub fn new(ts: DateTime<Utc>, values: [f64; CHANNEL_COUNT]) -> Self {
        Self {
            ts,
            sensor_id: None,
            location: None,
            values,
        }
    }

    pub fn with_sensor_id(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Parse and validate a reading from a JSONL line
    ///
    /// Unknown keys are ignored. `ts` and all five channel values are required.
    pub fn from_jsonl(line: &str) -> Result<Self, ReadingError> {
        let raw: RawReading = serde_json::from_str(line)?;

        let ts = raw.ts.ok_or(ReadingError::MissingField("ts"))?;
        let fields = [
            (Channel::TempC, raw.temp_c),
            (Channel::Humidity, raw.humidity),
            (Channel::GasPpm, raw.gas_ppm),
            (Channel::Smoke, raw.smoke),
            (Channel::BatteryV, raw.battery_v),
        ];

        let mut values = [0.0; CHANNEL_COUNT];
        for (channel, value) in fields {
            let value = value.ok_or(ReadingError::MissingField(channel.as_str()))?;
            if !value.is_finite() {
                return Err(ReadingError::NonFinite(channel.as_str()));
            }
            values[channel.index()] = value;
        }

        Ok(Self {
            ts,
            sensor_id: raw.sensor_id,
            location: raw.location,
            values,
        })
    }

    pub fn ts(&self) -> DateTime<Utc> {
        self.ts
    }

    pub fn sensor_id(&self) -> Option<&str> {
        self.sensor_id.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn value(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    /// Encode back to the JSONL wire shape accepted by `from_jsonl`
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireReading {
            ts: self.ts.to_rfc3339(),
            sensor_id: self.sensor_id.as_deref(),
            location: self.location.as_deref(),
            temp_c: self.value(Channel::TempC),
            humidity: self.value(Channel::Humidity),
            gas_ppm: self.value(Channel::GasPpm),
            smoke: self.value(Channel::Smoke),
            battery_v: self.value(Channel::BatteryV),
        })
    }

    /// Logical stream this reading belongs to
    pub fn stream_key<'a>(&'a self, default: &'a str) -> &'a str {
        self.sensor_id.as_deref().unwrap_or(default)
    }
}

//! Core data types for sensor readings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of sensor kinds a device can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// Temperature and humidity
    #[serde(rename = "DHT22")]
    Dht22,
    /// Gas concentration and air quality label
    #[serde(rename = "MQ135")]
    Mq135,
    /// Particulate matter concentrations
    #[serde(rename = "pmValue")]
    PmValue,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::Dht22, SensorKind::Mq135, SensorKind::PmValue];

    /// Top-level key carrying this kind in an inbound message
    pub fn inbound_key(self) -> &'static str {
        match self {
            SensorKind::Dht22 => "DHT22",
            SensorKind::Mq135 => "mq135",
            SensorKind::PmValue => "pmValue",
        }
    }

    /// Label used as `sensor_type` in outbound data messages
    pub fn label(self) -> &'static str {
        match self {
            SensorKind::Dht22 => "DHT22",
            SensorKind::Mq135 => "MQ135",
            SensorKind::PmValue => "pmValue",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dht22Fields {
    #[serde(rename = "temC")]
    pub tem_c: f64,
    pub humi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mq135Fields {
    pub value: f64,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmFields {
    #[serde(rename = "PM_1p0")]
    pub pm_1p0: f64,
    #[serde(rename = "PM_2p5")]
    pub pm_2p5: f64,
    #[serde(rename = "PM_4p0")]
    pub pm_4p0: f64,
    #[serde(rename = "PM_10p0")]
    pub pm_10p0: f64,
    pub quality: String,
}

/// A complete field set for one sensor kind
///
/// Serializes as the bare field mapping, which is the `value` payload of an
/// outbound data message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorReading {
    Dht22(Dht22Fields),
    Mq135(Mq135Fields),
    PmValue(PmFields),
}

impl SensorReading {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorReading::Dht22(_) => SensorKind::Dht22,
            SensorReading::Mq135(_) => SensorKind::Mq135,
            SensorReading::PmValue(_) => SensorKind::PmValue,
        }
    }
}

/// Opaque identifier of a stored hourly record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scope that hourly records belong to (a device, or a single session)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable row holding the latest reading of a kind within one calendar hour
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRecord {
    pub id: RecordId,
    pub stream: StreamId,
    pub reading: SensorReading,
    pub timestamp: DateTime<Utc>,
}

impl HourlyRecord {
    pub fn kind(&self) -> SensorKind {
        self.reading.kind()
    }
}

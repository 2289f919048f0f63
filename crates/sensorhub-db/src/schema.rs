//! Database schema types for the hourly sensor tables
//!
//! IMPORTANT: The tables are expected to exist already. Each has the shape
//!
//! ```sql
//! CREATE TABLE dht22_data (
//!     id        BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
//!     stream    VARCHAR(128) NOT NULL,
//!     temC      DOUBLE NOT NULL,
//!     humi      DOUBLE NOT NULL,
//!     timestamp TIMESTAMP(6) NOT NULL,
//!     INDEX (stream, id)
//! );
//! ```
//!
//! with the kind's own field columns in place of `temC`/`humi`.

use chrono::{DateTime, Utc};
use sensorhub_core::{
    Dht22Fields, HourlyRecord, Mq135Fields, PmFields, RecordId, SensorKind, SensorReading,
    StreamId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Dht22Row {
    pub id: u64,
    pub stream: String,
    #[sqlx(rename = "temC")]
    pub tem_c: f64,
    pub humi: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Mq135Row {
    pub id: u64,
    pub stream: String,
    pub value: f64,
    pub quality: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PmValueRow {
    pub id: u64,
    pub stream: String,
    #[sqlx(rename = "PM_1p0")]
    pub pm_1p0: f64,
    #[sqlx(rename = "PM_2p5")]
    pub pm_2p5: f64,
    #[sqlx(rename = "PM_4p0")]
    pub pm_4p0: f64,
    #[sqlx(rename = "PM_10p0")]
    pub pm_10p0: f64,
    pub quality: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Dht22Row> for HourlyRecord {
    fn from(row: Dht22Row) -> Self {
        HourlyRecord {
            id: RecordId(row.id),
            stream: StreamId::new(row.stream),
            reading: SensorReading::Dht22(Dht22Fields {
                tem_c: row.tem_c,
                humi: row.humi,
            }),
            timestamp: row.timestamp,
        }
    }
}

impl From<Mq135Row> for HourlyRecord {
    fn from(row: Mq135Row) -> Self {
        HourlyRecord {
            id: RecordId(row.id),
            stream: StreamId::new(row.stream),
            reading: SensorReading::Mq135(Mq135Fields {
                value: row.value,
                quality: row.quality,
            }),
            timestamp: row.timestamp,
        }
    }
}

impl From<PmValueRow> for HourlyRecord {
    fn from(row: PmValueRow) -> Self {
        HourlyRecord {
            id: RecordId(row.id),
            stream: StreamId::new(row.stream),
            reading: SensorReading::PmValue(PmFields {
                pm_1p0: row.pm_1p0,
                pm_2p5: row.pm_2p5,
                pm_4p0: row.pm_4p0,
                pm_10p0: row.pm_10p0,
                quality: row.quality,
            }),
            timestamp: row.timestamp,
        }
    }
}

/// Table names, one per sensor kind
pub mod tables {
    pub const DHT22: &str = "dht22_data";
    pub const MQ135: &str = "mq135_data";
    pub const PM_VALUE: &str = "pm_value_data";
}

pub fn table_for(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Dht22 => tables::DHT22,
        SensorKind::Mq135 => tables::MQ135,
        SensorKind::PmValue => tables::PM_VALUE,
    }
}

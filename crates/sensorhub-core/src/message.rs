//! Outbound messages sent to a session's transport

use crate::types::{SensorKind, SensorReading};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub const NO_DATA_MESSAGE: &str = "No data received from sensors.";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// An accepted reading as fanned out to every session in a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataMessage {
    pub value: SensorReading,
    /// ISO-8601 timestamp of the reading
    pub timestamp: String,
    pub sensor_type: SensorKind,
}

impl DataMessage {
    pub fn new(reading: SensorReading, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_type: reading.kind(),
            value: reading,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    NoData,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusNotice {
    pub status: NoticeStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Data(DataMessage),
    Status(StatusNotice),
}

impl OutboundMessage {
    pub fn no_data() -> Self {
        OutboundMessage::Status(StatusNotice {
            status: NoticeStatus::NoData,
            message: NO_DATA_MESSAGE.to_string(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundMessage::Status(StatusNotice {
            status: NoticeStatus::Error,
            message: message.into(),
        })
    }

    /// Error notice for a payload that could not be decoded
    pub fn invalid_input(detail: impl std::fmt::Display) -> Self {
        Self::error(format!("Invalid input format: {}", detail))
    }

    pub fn internal_error() -> Self {
        Self::error(INTERNAL_ERROR_MESSAGE)
    }

    pub fn status(&self) -> Option<NoticeStatus> {
        match self {
            OutboundMessage::Data(_) => None,
            OutboundMessage::Status(notice) => Some(notice.status),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<DataMessage> for OutboundMessage {
    fn from(message: DataMessage) -> Self {
        OutboundMessage::Data(message)
    }
}

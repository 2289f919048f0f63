//! Inbound message decoding
//!
//! A message is a JSON object carrying any subset of the known sensor keys.
//! A kind is only emitted when every one of its required fields is present
//! and non-null; incomplete kinds are skipped without an error.

use crate::types::{Dht22Fields, Mq135Fields, PmFields, SensorKind, SensorReading};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object at the top level")]
    NotAnObject,

    #[error("{kind} payload must be an object")]
    InvalidKind { kind: SensorKind },

    #[error("{kind}.{field} must be a {expected}")]
    InvalidField {
        kind: SensorKind,
        field: &'static str,
        expected: &'static str,
    },
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// A decoded inbound message, not yet split into readings
#[derive(Debug, Clone)]
pub struct InboundMessage {
    fields: Map<String, Value>,
}

/// Decode raw text into an inbound message
pub fn decode_message(text: &str) -> DecodeResult<InboundMessage> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(fields) => Ok(InboundMessage { fields }),
        _ => Err(DecodeError::NotAnObject),
    }
}

impl InboundMessage {
    /// Extract the reading for one kind
    ///
    /// Returns `Ok(None)` when the kind is absent or incomplete.
    pub fn reading(&self, kind: SensorKind) -> DecodeResult<Option<SensorReading>> {
        let payload = match self.fields.get(kind.inbound_key()) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(payload)) => payload,
            Some(_) => return Err(DecodeError::InvalidKind { kind }),
        };
        let fields = KindFields { kind, payload };

        let reading = match kind {
            SensorKind::Dht22 => {
                let (Some(tem_c), Some(humi)) = (fields.number("temC")?, fields.number("humi")?)
                else {
                    return Ok(None);
                };
                SensorReading::Dht22(Dht22Fields { tem_c, humi })
            }
            SensorKind::Mq135 => {
                let (Some(value), Some(quality)) =
                    (fields.number("value")?, fields.text("quality")?)
                else {
                    return Ok(None);
                };
                SensorReading::Mq135(Mq135Fields { value, quality })
            }
            SensorKind::PmValue => {
                let (Some(pm_1p0), Some(pm_2p5), Some(pm_4p0), Some(pm_10p0), Some(quality)) = (
                    fields.number("PM_1p0")?,
                    fields.number("PM_2p5")?,
                    fields.number("PM_4p0")?,
                    fields.number("PM_10p0")?,
                    fields.text("quality")?,
                ) else {
                    return Ok(None);
                };
                SensorReading::PmValue(PmFields {
                    pm_1p0,
                    pm_2p5,
                    pm_4p0,
                    pm_10p0,
                    quality,
                })
            }
        };
        Ok(Some(reading))
    }

    /// Complete readings in `SensorKind::ALL` order, with per-kind errors
    pub fn readings(&self) -> impl Iterator<Item = DecodeResult<SensorReading>> + '_ {
        SensorKind::ALL
            .into_iter()
            .filter_map(move |kind| self.reading(kind).transpose())
    }
}

struct KindFields<'a> {
    kind: SensorKind,
    payload: &'a Map<String, Value>,
}

impl KindFields<'_> {
    fn number(&self, field: &'static str) -> DecodeResult<Option<f64>> {
        match self.payload.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or(DecodeError::InvalidField {
                kind: self.kind,
                field,
                expected: "number",
            }),
        }
    }

    fn text(&self, field: &'static str) -> DecodeResult<Option<String>> {
        match self.payload.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(DecodeError::InvalidField {
                kind: self.kind,
                field,
                expected: "string",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(text: &str) -> Vec<SensorReading> {
        decode_message(text)
            .unwrap()
            .readings()
            .collect::<DecodeResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_dht22_reading() {
        let parsed = readings(r#"{"DHT22":{"temC":21.5,"humi":40}}"#);
        assert_eq!(
            parsed,
            vec![SensorReading::Dht22(Dht22Fields {
                tem_c: 21.5,
                humi: 40.0
            })]
        );
    }

    #[test]
    fn test_all_kinds_in_one_message() {
        let parsed = readings(
            r#"{
                "pmValue": {"PM_1p0": 1, "PM_2p5": 2, "PM_4p0": 3, "PM_10p0": 4, "quality": "good"},
                "mq135": {"value": 120.5, "quality": "moderate"},
                "DHT22": {"temC": 20, "humi": 55.5}
            }"#,
        );
        let kinds: Vec<_> = parsed.iter().map(SensorReading::kind).collect();
        assert_eq!(
            kinds,
            vec![SensorKind::Dht22, SensorKind::Mq135, SensorKind::PmValue]
        );
    }

    #[test]
    fn test_incomplete_kind_is_skipped() {
        let parsed = readings(
            r#"{"pmValue":{"PM_1p0":1,"PM_2p5":2},"mq135":{"value":80,"quality":"good"}}"#,
        );
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind(), SensorKind::Mq135);
    }

    #[test]
    fn test_null_field_is_skipped() {
        let parsed = readings(r#"{"DHT22":{"temC":null,"humi":40}}"#);
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let parsed = readings(r#"{"bme280":{"pressure":1013}}"#);
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let err = decode_message("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_top_level_must_be_object() {
        let err = decode_message("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn test_wrong_field_type_is_per_kind_error() {
        let message =
            decode_message(r#"{"DHT22":{"temC":"warm","humi":40},"mq135":{"value":1,"quality":"good"}}"#)
                .unwrap();
        let results: Vec<_> = message.readings().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(DecodeError::InvalidField {
                kind: SensorKind::Dht22,
                field: "temC",
                ..
            })
        ));
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_kind_payload_must_be_object() {
        let message = decode_message(r#"{"mq135": 42}"#).unwrap();
        let err = message.reading(SensorKind::Mq135).unwrap_err();
        assert_eq!(err.to_string(), "MQ135 payload must be an object");
    }
}

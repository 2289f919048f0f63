//! Per-session in-memory state: latest values and open hourly rows

use sensorhub_core::{HourKey, RecordId, SensorKind, SensorReading};
use std::collections::{BTreeMap, HashMap};

/// Most recently accepted reading of each kind
///
/// Entries are replaced as a whole; a kind is never partially updated.
#[derive(Debug, Clone, Default)]
pub struct LatestValues {
    readings: BTreeMap<SensorKind, SensorReading>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for the reading's kind, returning the previous one
    pub fn record(&mut self, reading: SensorReading) -> Option<SensorReading> {
        self.readings.insert(reading.kind(), reading)
    }

    pub fn get(&self, kind: SensorKind) -> Option<&SensorReading> {
        self.readings.get(&kind)
    }

    /// Cached readings in kind order
    pub fn readings(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.values()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Hourly record a session is currently updating, per kind
///
/// Each id is remembered together with the calendar hour it was opened or
/// adopted for, so a row from an earlier hour is never mistaken for the open
/// one when other sessions write to the same stream.
#[derive(Debug, Clone, Default)]
pub struct CurrentRows {
    rows: HashMap<SensorKind, (RecordId, HourKey)>,
}

impl CurrentRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: SensorKind) -> Option<RecordId> {
        self.rows.get(&kind).map(|(id, _)| *id)
    }

    pub fn set(&mut self, kind: SensorKind, id: RecordId, hour: HourKey) {
        self.rows.insert(kind, (id, hour));
    }

    pub fn forget(&mut self, kind: SensorKind) -> Option<RecordId> {
        self.rows.remove(&kind).map(|(id, _)| id)
    }

    /// Remembered id for `kind` if it belongs to `hour`, otherwise adopt `found`
    pub fn get_or_adopt(&mut self, kind: SensorKind, found: RecordId, hour: HourKey) -> RecordId {
        match self.rows.get(&kind) {
            Some(&(id, remembered)) if remembered == hour => id,
            _ => {
                self.rows.insert(kind, (found, hour));
                found
            }
        }
    }
}

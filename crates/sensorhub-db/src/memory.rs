//! In-process record store

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sensorhub_core::{
    HourlyRecord, RecordId, RecordNotFound, RecordStore, SensorKind, SensorReading, StreamId,
};
use std::sync::{Mutex, MutexGuard};

/// Record store kept entirely in memory
///
/// Ids are assigned from one counter shared by all kinds, so insertion order
/// is also id order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<HourlyRecord>,
    next_id: u64,
    writes: usize,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All records of a kind in insertion order
    pub fn records(&self, kind: SensorKind) -> Vec<HourlyRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of successful creates and updates
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Make every subsequent create/update fail until reset
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn create(
        &self,
        stream: &StreamId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordId> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(anyhow!("memory store rejected write"));
        }
        inner.next_id += 1;
        let id = RecordId(inner.next_id);
        inner.records.push(HourlyRecord {
            id,
            stream: stream.clone(),
            reading: reading.clone(),
            timestamp,
        });
        inner.writes += 1;
        Ok(id)
    }

    async fn update_by_id(
        &self,
        id: RecordId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(anyhow!("memory store rejected write"));
        }
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id && r.kind() == reading.kind())
            .ok_or(RecordNotFound(id))?;
        record.reading = reading.clone();
        record.timestamp = timestamp;
        inner.writes += 1;
        Ok(())
    }

    async fn most_recent(
        &self,
        stream: &StreamId,
        kind: SensorKind,
    ) -> Result<Option<HourlyRecord>> {
        Ok(self
            .lock()
            .records
            .iter()
            .rev()
            .find(|r| r.kind() == kind && &r.stream == stream)
            .cloned())
    }
}

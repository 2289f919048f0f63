use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{HourlyRecord, RecordId, SensorKind, SensorReading, StreamId};

/// Returned by [`RecordStore::update_by_id`] when the record no longer exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Record not found: {0}")]
pub struct RecordNotFound(pub RecordId);

/// Durable storage for hourly records, one table per sensor kind
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new hourly record and return its identifier
    async fn create(
        &self,
        stream: &StreamId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordId>;

    /// Overwrite the fields and timestamp of an existing record
    ///
    /// Fails with [`RecordNotFound`] if `id` does not exist.
    async fn update_by_id(
        &self,
        id: RecordId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// Most recently created record of a kind within a stream
    async fn most_recent(&self, stream: &StreamId, kind: SensorKind)
        -> Result<Option<HourlyRecord>>;
}

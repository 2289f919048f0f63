//! Hourly create-or-update decision against the record store

use crate::{CurrentRows, SessionError, SessionResult};
use chrono::{DateTime, Utc};
use sensorhub_core::{
    same_hour, HourKey, RecordId, RecordNotFound, RecordStore, SensorReading, StreamId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A reading opened a new hourly record
    Created(RecordId),
    /// A reading overwrote the open record of its hour
    Updated(RecordId),
}

impl UpsertOutcome {
    pub fn id(&self) -> RecordId {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// Writes readings of one stream into hourly records
pub struct HourlyUpsert {
    store: Arc<dyn RecordStore>,
    stream: StreamId,
    store_timeout: Duration,
}

impl HourlyUpsert {
    pub fn new(store: Arc<dyn RecordStore>, stream: StreamId, store_timeout: Duration) -> Self {
        Self {
            store,
            stream,
            store_timeout,
        }
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Persist `reading` taken at `at`
    ///
    /// A reading in a different calendar hour than the stream's most recent
    /// record creates a new record and remembers its id in `rows`. Otherwise
    /// the remembered record is updated in place. A session with no
    /// remembered id for that hour adopts the most recent record, and a
    /// remembered record that has vanished from the store is forgotten.
    #[instrument(skip(self, rows, reading), fields(stream = %self.stream, kind = %reading.kind()))]
    pub async fn upsert(
        &self,
        rows: &mut CurrentRows,
        reading: &SensorReading,
        at: DateTime<Utc>,
    ) -> SessionResult<UpsertOutcome> {
        let kind = reading.kind();
        let hour = HourKey::of(at);
        let latest = self
            .bounded(self.store.most_recent(&self.stream, kind))
            .await?;

        match latest {
            Some(record) if same_hour(record.timestamp, at) => {
                let id = rows.get_or_adopt(kind, record.id, hour);
                let updated = self
                    .bounded(self.store.update_by_id(id, reading, at))
                    .await;
                if let Err(SessionError::Store(e)) = &updated {
                    if e.downcast_ref::<RecordNotFound>().is_some() {
                        warn!(%id, "Hourly record vanished from store");
                        rows.forget(kind);
                    }
                }
                updated?;
                debug!(%id, "Updated hourly record");
                Ok(UpsertOutcome::Updated(id))
            }
            _ => {
                let id = self
                    .bounded(self.store.create(&self.stream, reading, at))
                    .await?;
                rows.set(kind, id, hour);
                info!(%id, "Opened hourly record");
                Ok(UpsertOutcome::Created(id))
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> SessionResult<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(SessionError::Store),
            Err(_) => Err(SessionError::StoreTimeout(self.store_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sensorhub_core::{Dht22Fields, HourlyRecord, Mq135Fields, SensorKind};
    use sensorhub_db::MemoryStore;

    fn dht(tem_c: f64) -> SensorReading {
        SensorReading::Dht22(Dht22Fields { tem_c, humi: 40.0 })
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    fn engine(store: Arc<MemoryStore>) -> HourlyUpsert {
        HourlyUpsert::new(store, StreamId::new("kitchen"), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_same_hour_updates_open_record() {
        let store = Arc::new(MemoryStore::new());
        let upsert = engine(store.clone());
        let mut rows = CurrentRows::new();

        let first = upsert.upsert(&mut rows, &dht(20.0), at(10, 5)).await.unwrap();
        let second = upsert.upsert(&mut rows, &dht(22.0), at(10, 40)).await.unwrap();

        assert!(matches!(first, UpsertOutcome::Created(_)));
        assert_eq!(second, UpsertOutcome::Updated(first.id()));

        let records = store.records(SensorKind::Dht22);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reading, dht(22.0));
        assert_eq!(records[0].timestamp, at(10, 40));
    }

    #[tokio::test]
    async fn test_new_hour_creates_record() {
        let store = Arc::new(MemoryStore::new());
        let upsert = engine(store.clone());
        let mut rows = CurrentRows::new();

        let first = upsert.upsert(&mut rows, &dht(20.0), at(10, 59)).await.unwrap();
        let second = upsert.upsert(&mut rows, &dht(21.0), at(11, 1)).await.unwrap();

        assert!(matches!(second, UpsertOutcome::Created(_)));
        assert_ne!(first.id(), second.id());
        assert_eq!(rows.get(SensorKind::Dht22), Some(second.id()));

        let records = store.records(SensorKind::Dht22);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reading, dht(20.0));
        assert_eq!(records[0].timestamp, at(10, 59));
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let upsert = engine(store.clone());
        let mut rows = CurrentRows::new();
        let gas = SensorReading::Mq135(Mq135Fields {
            value: 100.0,
            quality: "moderate".into(),
        });

        upsert.upsert(&mut rows, &dht(20.0), at(10, 5)).await.unwrap();
        let outcome = upsert.upsert(&mut rows, &gas, at(10, 6)).await.unwrap();

        assert!(matches!(outcome, UpsertOutcome::Created(_)));
        assert_eq!(store.records(SensorKind::Mq135).len(), 1);
        assert_eq!(store.records(SensorKind::Dht22).len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_session_adopts_record_of_current_hour() {
        let store = Arc::new(MemoryStore::new());
        let mut earlier_rows = CurrentRows::new();
        let existing = engine(store.clone())
            .upsert(&mut earlier_rows, &dht(20.0), at(10, 5))
            .await
            .unwrap();

        let mut rows = CurrentRows::new();
        let outcome = engine(store.clone())
            .upsert(&mut rows, &dht(23.0), at(10, 30))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated(existing.id()));
        assert_eq!(rows.get(SensorKind::Dht22), Some(existing.id()));
        assert_eq!(store.records(SensorKind::Dht22).len(), 1);
    }

    #[tokio::test]
    async fn test_update_targets_remembered_row() {
        let store = Arc::new(MemoryStore::new());
        let upsert = engine(store.clone());
        let mut rows = CurrentRows::new();

        let remembered = upsert.upsert(&mut rows, &dht(20.0), at(10, 5)).await.unwrap();
        // Another writer on the same stream opens a newer row in the hour.
        let newer = store
            .create(&StreamId::new("kitchen"), &dht(30.0), at(10, 10))
            .await
            .unwrap();

        let outcome = upsert.upsert(&mut rows, &dht(25.0), at(10, 20)).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated(remembered.id()));
        let records = store.records(SensorKind::Dht22);
        let newer_record = records.iter().find(|r| r.id == newer).unwrap();
        assert_eq!(newer_record.reading, dht(30.0));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes(true);
        let upsert = engine(store.clone());
        let mut rows = CurrentRows::new();

        let err = upsert
            .upsert(&mut rows, &dht(20.0), at(10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(rows.get(SensorKind::Dht22), None);
    }

    #[tokio::test]
    async fn test_vanished_row_is_forgotten() {
        let store = Arc::new(MemoryStore::new());
        let upsert = engine(store.clone());
        let mut rows = CurrentRows::new();

        upsert.upsert(&mut rows, &dht(20.0), at(10, 5)).await.unwrap();
        // The remembered row is gone but the stream still has one in the hour.
        let survivor = store
            .create(&StreamId::new("kitchen"), &dht(30.0), at(10, 10))
            .await
            .unwrap();
        rows.set(SensorKind::Dht22, RecordId(999), HourKey::of(at(10, 0)));

        let err = upsert
            .upsert(&mut rows, &dht(21.0), at(10, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(rows.get(SensorKind::Dht22), None);

        let outcome = upsert.upsert(&mut rows, &dht(22.0), at(10, 30)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated(survivor));
        assert_eq!(rows.get(SensorKind::Dht22), Some(survivor));
    }

    #[tokio::test]
    async fn test_row_from_earlier_hour_is_not_updated() {
        let store = Arc::new(MemoryStore::new());
        let upsert = engine(store.clone());
        let mut rows = CurrentRows::new();

        let ten = upsert.upsert(&mut rows, &dht(20.0), at(10, 5)).await.unwrap();
        // Another writer on the stream opened the 11:00 row.
        let eleven = store
            .create(&StreamId::new("kitchen"), &dht(25.0), at(11, 5))
            .await
            .unwrap();

        let outcome = upsert.upsert(&mut rows, &dht(26.0), at(11, 10)).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated(eleven));
        let records = store.records(SensorKind::Dht22);
        let ten_record = records.iter().find(|r| r.id == ten.id()).unwrap();
        assert_eq!(ten_record.reading, dht(20.0));
        assert_eq!(ten_record.timestamp, at(10, 5));
    }

    struct StalledStore;

    #[async_trait::async_trait]
    impl RecordStore for StalledStore {
        async fn create(
            &self,
            _stream: &StreamId,
            _reading: &SensorReading,
            _timestamp: DateTime<Utc>,
        ) -> anyhow::Result<RecordId> {
            std::future::pending().await
        }

        async fn update_by_id(
            &self,
            _id: RecordId,
            _reading: &SensorReading,
            _timestamp: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            std::future::pending().await
        }

        async fn most_recent(
            &self,
            _stream: &StreamId,
            _kind: SensorKind,
        ) -> anyhow::Result<Option<HourlyRecord>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_calls_are_bounded() {
        let upsert = HourlyUpsert::new(
            Arc::new(StalledStore),
            StreamId::new("kitchen"),
            Duration::from_secs(2),
        );
        let mut rows = CurrentRows::new();

        let err = upsert
            .upsert(&mut rows, &dht(20.0), at(10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::StoreTimeout(d) if d == Duration::from_secs(2)));
    }
}

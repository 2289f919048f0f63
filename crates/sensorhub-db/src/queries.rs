//! Database query operations for the hourly sensor tables

use crate::schema::{Dht22Row, Mq135Row, PmValueRow};
use crate::{DbClient, DbError, DbResult};
use chrono::{DateTime, Utc};
use sensorhub_core::{
    HourlyRecord, RecordId, RecordNotFound, RecordStore, SensorKind, SensorReading, StreamId,
};
use tracing::{debug, instrument};

impl DbClient {
    /// Insert a new hourly record and return its auto-increment id
    #[instrument(skip(self, reading), fields(kind = %reading.kind()))]
    pub async fn insert_record(
        &self,
        stream: &StreamId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> DbResult<RecordId> {
        let result = match reading {
            SensorReading::Dht22(f) => {
                sqlx::query(
                    r#"
                    INSERT INTO dht22_data (stream, temC, humi, timestamp)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(stream.as_str())
                .bind(f.tem_c)
                .bind(f.humi)
                .bind(timestamp)
                .execute(self.pool())
                .await?
            }
            SensorReading::Mq135(f) => {
                sqlx::query(
                    r#"
                    INSERT INTO mq135_data (stream, value, quality, timestamp)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(stream.as_str())
                .bind(f.value)
                .bind(&f.quality)
                .bind(timestamp)
                .execute(self.pool())
                .await?
            }
            SensorReading::PmValue(f) => {
                sqlx::query(
                    r#"
                    INSERT INTO pm_value_data (stream, PM_1p0, PM_2p5, PM_4p0, PM_10p0, quality, timestamp)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(stream.as_str())
                .bind(f.pm_1p0)
                .bind(f.pm_2p5)
                .bind(f.pm_4p0)
                .bind(f.pm_10p0)
                .bind(&f.quality)
                .bind(timestamp)
                .execute(self.pool())
                .await?
            }
        };

        let id = RecordId(result.last_insert_id());
        debug!(%id, %stream, "Inserted hourly record");
        Ok(id)
    }

    /// Overwrite an hourly record in place
    #[instrument(skip(self, reading), fields(kind = %reading.kind()))]
    pub async fn update_record(
        &self,
        id: RecordId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = match reading {
            SensorReading::Dht22(f) => {
                sqlx::query("UPDATE dht22_data SET temC = ?, humi = ?, timestamp = ? WHERE id = ?")
                    .bind(f.tem_c)
                    .bind(f.humi)
                    .bind(timestamp)
                    .bind(id.0)
                    .execute(self.pool())
                    .await?
            }
            SensorReading::Mq135(f) => {
                sqlx::query(
                    "UPDATE mq135_data SET value = ?, quality = ?, timestamp = ? WHERE id = ?",
                )
                .bind(f.value)
                .bind(&f.quality)
                .bind(timestamp)
                .bind(id.0)
                .execute(self.pool())
                .await?
            }
            SensorReading::PmValue(f) => {
                sqlx::query(
                    r#"
                    UPDATE pm_value_data
                    SET PM_1p0 = ?, PM_2p5 = ?, PM_4p0 = ?, PM_10p0 = ?, quality = ?, timestamp = ?
                    WHERE id = ?
                    "#,
                )
                .bind(f.pm_1p0)
                .bind(f.pm_2p5)
                .bind(f.pm_4p0)
                .bind(f.pm_10p0)
                .bind(&f.quality)
                .bind(timestamp)
                .bind(id.0)
                .execute(self.pool())
                .await?
            }
        };

        // MySQL reports zero affected rows when the values are unchanged, so
        // only a missing row is worth checking for.
        if result.rows_affected() == 0 && !self.record_exists(reading.kind(), id).await? {
            return Err(DbError::NotFound(id));
        }

        debug!(%id, "Updated hourly record");
        Ok(())
    }

    /// Get the most recently inserted record of a kind for a stream
    #[instrument(skip(self))]
    pub async fn latest_record(
        &self,
        stream: &StreamId,
        kind: SensorKind,
    ) -> DbResult<Option<HourlyRecord>> {
        let record = match kind {
            SensorKind::Dht22 => sqlx::query_as::<_, Dht22Row>(
                r#"
                SELECT id, stream, temC, humi, timestamp FROM dht22_data
                WHERE stream = ?
                ORDER BY id DESC
                LIMIT 1
                "#,
            )
            .bind(stream.as_str())
            .fetch_optional(self.pool())
            .await?
            .map(HourlyRecord::from),
            SensorKind::Mq135 => sqlx::query_as::<_, Mq135Row>(
                r#"
                SELECT id, stream, value, quality, timestamp FROM mq135_data
                WHERE stream = ?
                ORDER BY id DESC
                LIMIT 1
                "#,
            )
            .bind(stream.as_str())
            .fetch_optional(self.pool())
            .await?
            .map(HourlyRecord::from),
            SensorKind::PmValue => sqlx::query_as::<_, PmValueRow>(
                r#"
                SELECT id, stream, PM_1p0, PM_2p5, PM_4p0, PM_10p0, quality, timestamp
                FROM pm_value_data
                WHERE stream = ?
                ORDER BY id DESC
                LIMIT 1
                "#,
            )
            .bind(stream.as_str())
            .fetch_optional(self.pool())
            .await?
            .map(HourlyRecord::from),
        };

        Ok(record)
    }

    async fn record_exists(&self, kind: SensorKind, id: RecordId) -> DbResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE id = ?",
            crate::schema::table_for(kind)
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_one(self.pool())
            .await?;
        Ok(count > 0)
    }
}

#[async_trait::async_trait]
impl RecordStore for DbClient {
    async fn create(
        &self,
        stream: &StreamId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<RecordId> {
        Ok(self.insert_record(stream, reading, timestamp).await?)
    }

    async fn update_by_id(
        &self,
        id: RecordId,
        reading: &SensorReading,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        match self.update_record(id, reading, timestamp).await {
            Err(DbError::NotFound(id)) => Err(RecordNotFound(id).into()),
            other => Ok(other?),
        }
    }

    async fn most_recent(
        &self,
        stream: &StreamId,
        kind: SensorKind,
    ) -> anyhow::Result<Option<HourlyRecord>> {
        Ok(self.latest_record(stream, kind).await?)
    }
}

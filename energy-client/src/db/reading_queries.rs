use std::collections::HashSet;

use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};

use crate::domain::{DeviceId, Reading};
use crate::error::StoreError;

/// Postgres caps a statement at 65535 bind parameters; five per row.
const MAX_ROWS_PER_INSERT: usize = 10_000;

/// Bulk insert; rows whose event id already exists are skipped.
pub async fn insert_readings(pool: &PgPool, readings: &[Reading]) -> Result<u64, StoreError> {
    let mut inserted = 0;
    for chunk in readings.chunks(MAX_ROWS_PER_INSERT) {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"INSERT INTO sensor_readings (event_id, device_id, ts, voltage, "current") "#,
        );
        builder.push_values(chunk, |mut b, r| {
            b.push_bind(r.event_id())
                .push_bind(r.device_id)
                .push_bind(r.ts)
                .push_bind(r.voltage)
                .push_bind(r.current);
        });
        builder.push(" ON CONFLICT (event_id) DO NOTHING");

        let result = builder.build().execute(pool).await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// The device's most recent readings, newest first.
pub async fn recent_readings(
    pool: &PgPool,
    device_id: DeviceId,
    limit: usize,
) -> Result<Vec<Reading>, StoreError> {
    let rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT device_id, ts, voltage, "current"
        FROM sensor_readings
        WHERE device_id = $1
        ORDER BY ts DESC
        LIMIT $2
        "#,
    )
    .bind(device_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetch a time-ordered slice of a device's readings.
pub async fn readings_between(
    pool: &PgPool,
    device_id: DeviceId,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<Reading>, StoreError> {
    let rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT device_id, ts, voltage, "current"
        FROM sensor_readings
        WHERE device_id = $1
          AND ts >= $2
          AND ts <  $3
        ORDER BY ts
        "#,
    )
    .bind(device_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Which of the given event ids are already stored.
pub async fn stored_event_ids(pool: &PgPool, event_ids: &[String]) -> Result<HashSet<String>, StoreError> {
    if event_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut known = HashSet::new();
    for chunk in event_ids.chunks(MAX_ROWS_PER_INSERT) {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT event_id FROM sensor_readings WHERE event_id = ANY($1)")
                .bind(chunk)
                .fetch_all(pool)
                .await?;
        known.extend(rows);
    }
    Ok(known)
}

pub async fn first_reading_date(pool: &PgPool, device_id: DeviceId) -> Result<Option<Date>, StoreError> {
    let first: Option<OffsetDateTime> =
        sqlx::query_scalar("SELECT MIN(ts) FROM sensor_readings WHERE device_id = $1")
            .bind(device_id)
            .fetch_one(pool)
            .await?;

    Ok(first.map(|ts| ts.to_offset(time::UtcOffset::UTC).date()))
}

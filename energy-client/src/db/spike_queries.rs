use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};

use crate::domain::{DeviceId, PowerSpike, SystemLogEntry, WeeklySpikeAnalysis};
use crate::error::StoreError;

/// Spikes already stored for their (device, ts) are skipped.
pub async fn insert_spikes(pool: &PgPool, spikes: &[PowerSpike]) -> Result<u64, StoreError> {
    if spikes.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO power_spikes (device_id, ts, peak_power, baseline_power, spike_magnitude, duration_seconds) ",
    );
    builder.push_values(spikes, |mut b, s| {
        b.push_bind(s.device_id)
            .push_bind(s.ts)
            .push_bind(s.peak_power)
            .push_bind(s.baseline_power)
            .push_bind(s.spike_magnitude)
            .push_bind(s.duration_seconds);
    });
    builder.push(" ON CONFLICT (device_id, ts) DO NOTHING");

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn spikes_between(
    pool: &PgPool,
    device_id: DeviceId,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<PowerSpike>, StoreError> {
    let rows = sqlx::query_as::<_, PowerSpike>(
        r#"
        SELECT device_id, ts, peak_power, baseline_power, spike_magnitude, duration_seconds
        FROM power_spikes
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

pub async fn upsert_weekly_analysis(pool: &PgPool, a: &WeeklySpikeAnalysis) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO weekly_spike_analyses
            (device_id, week_start, week_end, spike_count, max_spike_power, avg_baseline_power,
             spike_threshold, total_spike_duration_minutes, interpretation)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (device_id, week_start) DO UPDATE SET
            week_end                     = EXCLUDED.week_end,
            spike_count                  = EXCLUDED.spike_count,
            max_spike_power              = EXCLUDED.max_spike_power,
            avg_baseline_power           = EXCLUDED.avg_baseline_power,
            spike_threshold              = EXCLUDED.spike_threshold,
            total_spike_duration_minutes = EXCLUDED.total_spike_duration_minutes,
            interpretation               = EXCLUDED.interpretation
        "#,
    )
    .bind(a.device_id)
    .bind(a.week_start)
    .bind(a.week_end)
    .bind(a.spike_count)
    .bind(a.max_spike_power)
    .bind(a.avg_baseline_power)
    .bind(a.spike_threshold)
    .bind(a.total_spike_duration_minutes)
    .bind(&a.interpretation)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn weekly_analysis(
    pool: &PgPool,
    device_id: DeviceId,
    week_start: Date,
) -> Result<Option<WeeklySpikeAnalysis>, StoreError> {
    let row = sqlx::query_as::<_, WeeklySpikeAnalysis>(
        r#"
        SELECT device_id, week_start, week_end, spike_count, max_spike_power, avg_baseline_power,
               spike_threshold, total_spike_duration_minutes, interpretation
        FROM weekly_spike_analyses
        WHERE device_id = $1 AND week_start = $2
        "#,
    )
    .bind(device_id)
    .bind(week_start)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn append_logs(pool: &PgPool, entries: &[SystemLogEntry]) -> Result<(), StoreError> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut builder =
        QueryBuilder::<Postgres>::new("INSERT INTO system_logs (log_type, device_id, message, metadata, ts) ");
    builder.push_values(entries, |mut b, e| {
        b.push_bind(e.log_type.as_str())
            .push_bind(e.device_id)
            .push_bind(&e.message)
            .push_bind(e.metadata.clone())
            .push_bind(e.ts);
    });
    builder.build().execute(pool).await?;

    Ok(())
}

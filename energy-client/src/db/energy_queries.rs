use sqlx::{postgres::PgRow, FromRow, PgPool, Row};
use time::Date;

use crate::domain::{DeviceId, EnergyAggregation, EnergyRecord, PeriodType};
use crate::error::StoreError;

impl<'r> FromRow<'r, PgRow> for EnergyAggregation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let period: String = row.try_get("period_type")?;
        let period_type = PeriodType::parse(&period)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown period type '{period}'").into()))?;

        Ok(Self {
            device_id: row.try_get("device_id")?,
            period_start: row.try_get("period_start")?,
            period_type,
            total_energy_kwh: row.try_get("total_energy_kwh")?,
            peak_power_w: row.try_get("peak_power_w")?,
            total_cost: row.try_get("total_cost")?,
            total_co2: row.try_get("total_co2")?,
        })
    }
}

pub async fn upsert_energy_record(pool: &PgPool, record: &EnergyRecord) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO energy_records
            (device_id, date, total_energy_kwh, peak_power_w, cost_estimate, carbon_emission_kgco2)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (device_id, date) DO UPDATE SET
            total_energy_kwh     = EXCLUDED.total_energy_kwh,
            peak_power_w         = EXCLUDED.peak_power_w,
            cost_estimate        = EXCLUDED.cost_estimate,
            carbon_emission_kgco2 = EXCLUDED.carbon_emission_kgco2
        "#,
    )
    .bind(record.device_id)
    .bind(record.date)
    .bind(record.total_energy_kwh)
    .bind(record.peak_power_w)
    .bind(record.cost_estimate)
    .bind(record.carbon_emission_kgco2)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn energy_record(
    pool: &PgPool,
    device_id: DeviceId,
    date: Date,
) -> Result<Option<EnergyRecord>, StoreError> {
    let row = sqlx::query_as::<_, EnergyRecord>(
        r#"
        SELECT device_id, date, total_energy_kwh, peak_power_w, cost_estimate, carbon_emission_kgco2
        FROM energy_records
        WHERE device_id = $1 AND date = $2
        "#,
    )
    .bind(device_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn energy_records_between(
    pool: &PgPool,
    device_id: DeviceId,
    start: Date,
    end: Date,
) -> Result<Vec<EnergyRecord>, StoreError> {
    let rows = sqlx::query_as::<_, EnergyRecord>(
        r#"
        SELECT device_id, date, total_energy_kwh, peak_power_w, cost_estimate, carbon_emission_kgco2
        FROM energy_records
        WHERE device_id = $1
          AND date >= $2
          AND date <  $3
        ORDER BY date
        "#,
    )
    .bind(device_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn upsert_aggregation(pool: &PgPool, agg: &EnergyAggregation) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO energy_aggregations
            (device_id, period_start, period_type, total_energy_kwh, peak_power_w, total_cost, total_co2)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (device_id, period_start, period_type) DO UPDATE SET
            total_energy_kwh = EXCLUDED.total_energy_kwh,
            peak_power_w     = EXCLUDED.peak_power_w,
            total_cost       = EXCLUDED.total_cost,
            total_co2        = EXCLUDED.total_co2
        "#,
    )
    .bind(agg.device_id)
    .bind(agg.period_start)
    .bind(agg.period_type.as_str())
    .bind(agg.total_energy_kwh)
    .bind(agg.peak_power_w)
    .bind(agg.total_cost)
    .bind(agg.total_co2)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn aggregation(
    pool: &PgPool,
    device_id: DeviceId,
    period_type: PeriodType,
    period_start: Date,
) -> Result<Option<EnergyAggregation>, StoreError> {
    let row = sqlx::query_as::<_, EnergyAggregation>(
        r#"
        SELECT device_id, period_start, period_type, total_energy_kwh, peak_power_w, total_cost, total_co2
        FROM energy_aggregations
        WHERE device_id = $1 AND period_type = $2 AND period_start = $3
        "#,
    )
    .bind(device_id)
    .bind(period_type.as_str())
    .bind(period_start)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

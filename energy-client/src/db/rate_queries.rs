use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::{NewRate, RateKind, RateRecord};
use crate::error::StoreError;

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    id: i64,
    kind: String,
    value: f64,
    effective_from: OffsetDateTime,
    ended_at: Option<OffsetDateTime>,
}

impl TryFrom<RateRow> for RateRecord {
    type Error = StoreError;

    fn try_from(row: RateRow) -> Result<Self, Self::Error> {
        let kind = RateKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown rate kind '{}'", row.kind)))?;
        Ok(RateRecord {
            id: row.id,
            kind,
            value: row.value,
            effective_from: row.effective_from,
            ended_at: row.ended_at,
        })
    }
}

const RATE_COLUMNS: &str = "id, kind, value, effective_from, ended_at";

pub async fn rate_active_at(
    pool: &PgPool,
    kind: RateKind,
    at: OffsetDateTime,
) -> Result<Option<RateRecord>, StoreError> {
    let sql = format!(
        r#"
        SELECT {RATE_COLUMNS}
        FROM rate_settings
        WHERE kind = $1
          AND effective_from <= $2
          AND (ended_at IS NULL OR ended_at > $2)
        ORDER BY effective_from DESC, id DESC
        LIMIT 1
        "#
    );
    let row = sqlx::query_as::<_, RateRow>(&sql)
        .bind(kind.as_str())
        .bind(at)
        .fetch_optional(pool)
        .await?;

    row.map(RateRecord::try_from).transpose()
}

pub async fn earliest_rate(pool: &PgPool, kind: RateKind) -> Result<Option<RateRecord>, StoreError> {
    let sql = format!(
        "SELECT {RATE_COLUMNS} FROM rate_settings WHERE kind = $1 ORDER BY effective_from, id LIMIT 1"
    );
    let row = sqlx::query_as::<_, RateRow>(&sql)
        .bind(kind.as_str())
        .fetch_optional(pool)
        .await?;

    row.map(RateRecord::try_from).transpose()
}

/// Inserts the record; an open record colliding with the kind's active one
/// is dropped and `None` returned.
pub async fn insert_rate(pool: &PgPool, rate: NewRate) -> Result<Option<RateRecord>, StoreError> {
    let sql = format!(
        r#"
        INSERT INTO rate_settings (kind, value, effective_from, ended_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        RETURNING {RATE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, RateRow>(&sql)
        .bind(rate.kind.as_str())
        .bind(rate.value)
        .bind(rate.effective_from)
        .bind(rate.ended_at)
        .fetch_optional(pool)
        .await?;

    row.map(RateRecord::try_from).transpose()
}

/// End-dates the open record and opens the new one in one transaction.
pub async fn replace_active_rate(
    pool: &PgPool,
    kind: RateKind,
    value: f64,
    as_of: OffsetDateTime,
) -> Result<RateRecord, StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE rate_settings SET ended_at = $1 WHERE kind = $2 AND ended_at IS NULL")
        .bind(as_of)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?;

    let sql = format!(
        r#"
        INSERT INTO rate_settings (kind, value, effective_from, ended_at)
        VALUES ($1, $2, $3, NULL)
        RETURNING {RATE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, RateRow>(&sql)
        .bind(kind.as_str())
        .bind(value)
        .bind(as_of)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    row.try_into()
}

pub async fn rate_history(pool: &PgPool, kind: RateKind) -> Result<Vec<RateRecord>, StoreError> {
    let sql = format!(
        "SELECT {RATE_COLUMNS} FROM rate_settings WHERE kind = $1 ORDER BY effective_from, id"
    );
    let rows = sqlx::query_as::<_, RateRow>(&sql)
        .bind(kind.as_str())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(RateRecord::try_from).collect()
}

//! Postgres-backed store. The schema lives in `sql/schema/` and is applied
//! out-of-band.

pub mod device_queries;
pub mod energy_queries;
pub mod rate_queries;
pub mod reading_queries;
pub mod spike_queries;

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};

use crate::domain::{
    Device, DeviceId, DeviceStatus, EnergyAggregation, EnergyRecord, NewRate, PeriodType,
    PowerSpike, RateKind, RateRecord, Reading, SystemLogEntry, WeeklySpikeAnalysis,
};
use crate::error::StoreError;
use crate::store::{DeviceRegistry, EnergyStore, RateStore, ReadingStore, SpikeStore, SystemLogStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRegistry for PgStore {
    async fn find_device(&self, device_id: DeviceId) -> Result<Option<Device>, StoreError> {
        device_queries::find_device(&self.pool, device_id).await
    }

    async fn list_devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>, StoreError> {
        device_queries::list_devices(&self.pool, status).await
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn insert_readings(&self, readings: &[Reading]) -> Result<u64, StoreError> {
        reading_queries::insert_readings(&self.pool, readings).await
    }

    async fn recent_readings(&self, device_id: DeviceId, limit: usize) -> Result<Vec<Reading>, StoreError> {
        reading_queries::recent_readings(&self.pool, device_id, limit).await
    }

    async fn readings_between(
        &self,
        device_id: DeviceId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        reading_queries::readings_between(&self.pool, device_id, start, end).await
    }

    async fn stored_event_ids(&self, event_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        reading_queries::stored_event_ids(&self.pool, event_ids).await
    }

    async fn first_reading_date(&self, device_id: DeviceId) -> Result<Option<Date>, StoreError> {
        reading_queries::first_reading_date(&self.pool, device_id).await
    }
}

#[async_trait]
impl RateStore for PgStore {
    async fn rate_active_at(&self, kind: RateKind, at: OffsetDateTime) -> Result<Option<RateRecord>, StoreError> {
        rate_queries::rate_active_at(&self.pool, kind, at).await
    }

    async fn earliest_rate(&self, kind: RateKind) -> Result<Option<RateRecord>, StoreError> {
        rate_queries::earliest_rate(&self.pool, kind).await
    }

    async fn insert_rate(&self, rate: NewRate) -> Result<Option<RateRecord>, StoreError> {
        rate_queries::insert_rate(&self.pool, rate).await
    }

    async fn replace_active_rate(
        &self,
        kind: RateKind,
        value: f64,
        as_of: OffsetDateTime,
    ) -> Result<RateRecord, StoreError> {
        rate_queries::replace_active_rate(&self.pool, kind, value, as_of).await
    }

    async fn rate_history(&self, kind: RateKind) -> Result<Vec<RateRecord>, StoreError> {
        rate_queries::rate_history(&self.pool, kind).await
    }
}

#[async_trait]
impl EnergyStore for PgStore {
    async fn upsert_energy_record(&self, record: &EnergyRecord) -> Result<(), StoreError> {
        energy_queries::upsert_energy_record(&self.pool, record).await
    }

    async fn energy_record(&self, device_id: DeviceId, date: Date) -> Result<Option<EnergyRecord>, StoreError> {
        energy_queries::energy_record(&self.pool, device_id, date).await
    }

    async fn energy_records_between(
        &self,
        device_id: DeviceId,
        start: Date,
        end: Date,
    ) -> Result<Vec<EnergyRecord>, StoreError> {
        energy_queries::energy_records_between(&self.pool, device_id, start, end).await
    }

    async fn upsert_aggregation(&self, aggregation: &EnergyAggregation) -> Result<(), StoreError> {
        energy_queries::upsert_aggregation(&self.pool, aggregation).await
    }

    async fn aggregation(
        &self,
        device_id: DeviceId,
        period_type: PeriodType,
        period_start: Date,
    ) -> Result<Option<EnergyAggregation>, StoreError> {
        energy_queries::aggregation(&self.pool, device_id, period_type, period_start).await
    }
}

#[async_trait]
impl SpikeStore for PgStore {
    async fn insert_spikes(&self, spikes: &[PowerSpike]) -> Result<u64, StoreError> {
        spike_queries::insert_spikes(&self.pool, spikes).await
    }

    async fn spikes_between(
        &self,
        device_id: DeviceId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<PowerSpike>, StoreError> {
        spike_queries::spikes_between(&self.pool, device_id, start, end).await
    }

    async fn upsert_weekly_analysis(&self, analysis: &WeeklySpikeAnalysis) -> Result<(), StoreError> {
        spike_queries::upsert_weekly_analysis(&self.pool, analysis).await
    }

    async fn weekly_analysis(
        &self,
        device_id: DeviceId,
        week_start: Date,
    ) -> Result<Option<WeeklySpikeAnalysis>, StoreError> {
        spike_queries::weekly_analysis(&self.pool, device_id, week_start).await
    }
}

#[async_trait]
impl SystemLogStore for PgStore {
    async fn append_logs(&self, entries: &[SystemLogEntry]) -> Result<(), StoreError> {
        spike_queries::append_logs(&self.pool, entries).await
    }
}

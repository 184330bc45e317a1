//! Persistence seams used by the services.
//!
//! Writes are either upserts keyed by a natural key or inserts that ignore
//! rows already present, so a pass can always be re-run.

pub mod memory;

pub use memory::MemoryStore;

use std::collections::HashSet;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use crate::domain::{
    Device, DeviceId, DeviceStatus, EnergyAggregation, EnergyRecord, NewRate, PeriodType,
    PowerSpike, RateKind, RateRecord, Reading, SystemLogEntry, WeeklySpikeAnalysis,
};
use crate::error::StoreError;

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn find_device(&self, device_id: DeviceId) -> Result<Option<Device>, StoreError>;

    /// All devices, optionally restricted to one status, ordered by id.
    async fn list_devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>, StoreError>;
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Bulk insert. Readings whose event id is already stored are ignored;
    /// returns the number of rows actually added.
    async fn insert_readings(&self, readings: &[Reading]) -> Result<u64, StoreError>;

    /// Up to `limit` most recent readings for the device, newest first.
    async fn recent_readings(&self, device_id: DeviceId, limit: usize) -> Result<Vec<Reading>, StoreError>;

    /// Readings with `start <= ts < end`, oldest first.
    async fn readings_between(
        &self,
        device_id: DeviceId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError>;

    /// The subset of `event_ids` already stored.
    async fn stored_event_ids(&self, event_ids: &[String]) -> Result<HashSet<String>, StoreError>;

    async fn first_reading_date(&self, device_id: DeviceId) -> Result<Option<Date>, StoreError>;
}

#[async_trait]
pub trait RateStore: Send + Sync {
    /// Most recently started record active at `at`.
    async fn rate_active_at(&self, kind: RateKind, at: OffsetDateTime) -> Result<Option<RateRecord>, StoreError>;

    async fn earliest_rate(&self, kind: RateKind) -> Result<Option<RateRecord>, StoreError>;

    /// Inserts the record unless it would open a second active record for
    /// its kind, in which case nothing is written and `None` is returned.
    async fn insert_rate(&self, rate: NewRate) -> Result<Option<RateRecord>, StoreError>;

    /// Ends the currently open record (if any) at `as_of` and opens a new one,
    /// atomically.
    async fn replace_active_rate(
        &self,
        kind: RateKind,
        value: f64,
        as_of: OffsetDateTime,
    ) -> Result<RateRecord, StoreError>;

    async fn rate_history(&self, kind: RateKind) -> Result<Vec<RateRecord>, StoreError>;
}

#[async_trait]
pub trait EnergyStore: Send + Sync {
    /// Create or overwrite the record for (device, date).
    async fn upsert_energy_record(&self, record: &EnergyRecord) -> Result<(), StoreError>;

    async fn energy_record(&self, device_id: DeviceId, date: Date) -> Result<Option<EnergyRecord>, StoreError>;

    /// Daily records with `start <= date < end`, oldest first.
    async fn energy_records_between(
        &self,
        device_id: DeviceId,
        start: Date,
        end: Date,
    ) -> Result<Vec<EnergyRecord>, StoreError>;

    /// Create or overwrite the row for (device, period start, period type).
    async fn upsert_aggregation(&self, aggregation: &EnergyAggregation) -> Result<(), StoreError>;

    async fn aggregation(
        &self,
        device_id: DeviceId,
        period_type: PeriodType,
        period_start: Date,
    ) -> Result<Option<EnergyAggregation>, StoreError>;
}

#[async_trait]
pub trait SpikeStore: Send + Sync {
    /// Inserts spikes not yet stored for their (device, ts); returns how many
    /// were added.
    async fn insert_spikes(&self, spikes: &[PowerSpike]) -> Result<u64, StoreError>;

    /// Spikes with `start <= ts < end`, oldest first.
    async fn spikes_between(
        &self,
        device_id: DeviceId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<PowerSpike>, StoreError>;

    /// Create or overwrite the analysis for (device, week start).
    async fn upsert_weekly_analysis(&self, analysis: &WeeklySpikeAnalysis) -> Result<(), StoreError>;

    async fn weekly_analysis(
        &self,
        device_id: DeviceId,
        week_start: Date,
    ) -> Result<Option<WeeklySpikeAnalysis>, StoreError>;
}

#[async_trait]
pub trait SystemLogStore: Send + Sync {
    async fn append_logs(&self, entries: &[SystemLogEntry]) -> Result<(), StoreError>;
}

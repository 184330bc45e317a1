use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use super::{DeviceRegistry, EnergyStore, RateStore, ReadingStore, SpikeStore, SystemLogStore};
use crate::domain::{
    Device, DeviceId, DeviceStatus, EnergyAggregation, EnergyRecord, NewRate, PeriodType,
    PowerSpike, RateKind, RateRecord, Reading, SystemLogEntry, WeeklySpikeAnalysis,
};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    devices: BTreeMap<DeviceId, Device>,
    readings: Vec<Reading>,
    reading_ids: HashSet<String>,
    rates: Vec<RateRecord>,
    next_rate_id: i64,
    energy_records: HashMap<(DeviceId, Date), EnergyRecord>,
    aggregations: HashMap<(DeviceId, PeriodType, Date), EnergyAggregation>,
    spikes: Vec<PowerSpike>,
    weekly: HashMap<(DeviceId, Date), WeeklySpikeAnalysis>,
    logs: Vec<SystemLogEntry>,
}

impl Inner {
    fn push_rate(&mut self, rate: NewRate) -> RateRecord {
        self.next_rate_id += 1;
        let record = RateRecord {
            id: self.next_rate_id,
            kind: rate.kind,
            value: rate.value,
            effective_from: rate.effective_from,
            ended_at: rate.ended_at,
        };
        self.rates.push(record.clone());
        record
    }
}

/// Process-local store, used by tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices<I>(devices: I) -> Self
    where
        I: IntoIterator<Item = Device>,
    {
        let store = Self::new();
        for d in devices {
            store.add_device(d);
        }
        store
    }

    pub fn add_device(&self, device: Device) {
        self.lock().devices.insert(device.device_id, device);
    }

    pub fn reading_count(&self) -> usize {
        self.lock().readings.len()
    }

    pub fn spikes(&self) -> Vec<PowerSpike> {
        self.lock().spikes.clone()
    }

    pub fn logs(&self) -> Vec<SystemLogEntry> {
        self.lock().logs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn find_device(&self, device_id: DeviceId) -> Result<Option<Device>, StoreError> {
        Ok(self.lock().devices.get(&device_id).cloned())
    }

    async fn list_devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .lock()
            .devices
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert_readings(&self, readings: &[Reading]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut added = 0;
        for r in readings {
            if inner.reading_ids.insert(r.event_id()) {
                inner.readings.push(r.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    async fn recent_readings(&self, device_id: DeviceId, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let mut rows: Vec<Reading> = self
            .lock()
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.ts.cmp(&a.ts));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn readings_between(
        &self,
        device_id: DeviceId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        let mut rows: Vec<Reading> = self
            .lock()
            .readings
            .iter()
            .filter(|r| r.device_id == device_id && r.ts >= start && r.ts < end)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.ts);
        Ok(rows)
    }

    async fn stored_event_ids(&self, event_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        let inner = self.lock();
        Ok(event_ids
            .iter()
            .filter(|id| inner.reading_ids.contains(*id))
            .cloned()
            .collect())
    }

    async fn first_reading_date(&self, device_id: DeviceId) -> Result<Option<Date>, StoreError> {
        Ok(self
            .lock()
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .map(|r| r.ts)
            .min()
            .map(|ts| ts.to_offset(time::UtcOffset::UTC).date()))
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn rate_active_at(&self, kind: RateKind, at: OffsetDateTime) -> Result<Option<RateRecord>, StoreError> {
        Ok(self
            .lock()
            .rates
            .iter()
            .filter(|r| r.kind == kind && r.is_active_at(at))
            .max_by_key(|r| (r.effective_from, r.id))
            .cloned())
    }

    async fn earliest_rate(&self, kind: RateKind) -> Result<Option<RateRecord>, StoreError> {
        Ok(self
            .lock()
            .rates
            .iter()
            .filter(|r| r.kind == kind)
            .min_by_key(|r| (r.effective_from, r.id))
            .cloned())
    }

    async fn insert_rate(&self, rate: NewRate) -> Result<Option<RateRecord>, StoreError> {
        let mut inner = self.lock();
        let opens_second = rate.ended_at.is_none()
            && inner
                .rates
                .iter()
                .any(|r| r.kind == rate.kind && r.ended_at.is_none());
        if opens_second {
            return Ok(None);
        }
        Ok(Some(inner.push_rate(rate)))
    }

    async fn replace_active_rate(
        &self,
        kind: RateKind,
        value: f64,
        as_of: OffsetDateTime,
    ) -> Result<RateRecord, StoreError> {
        let mut inner = self.lock();
        for r in inner
            .rates
            .iter_mut()
            .filter(|r| r.kind == kind && r.ended_at.is_none())
        {
            r.ended_at = Some(as_of);
        }
        Ok(inner.push_rate(NewRate {
            kind,
            value,
            effective_from: as_of,
            ended_at: None,
        }))
    }

    async fn rate_history(&self, kind: RateKind) -> Result<Vec<RateRecord>, StoreError> {
        let mut rows: Vec<RateRecord> = self
            .lock()
            .rates
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.effective_from, r.id));
        Ok(rows)
    }
}

#[async_trait]
impl EnergyStore for MemoryStore {
    async fn upsert_energy_record(&self, record: &EnergyRecord) -> Result<(), StoreError> {
        self.lock()
            .energy_records
            .insert((record.device_id, record.date), record.clone());
        Ok(())
    }

    async fn energy_record(&self, device_id: DeviceId, date: Date) -> Result<Option<EnergyRecord>, StoreError> {
        Ok(self.lock().energy_records.get(&(device_id, date)).cloned())
    }

    async fn energy_records_between(
        &self,
        device_id: DeviceId,
        start: Date,
        end: Date,
    ) -> Result<Vec<EnergyRecord>, StoreError> {
        let mut rows: Vec<EnergyRecord> = self
            .lock()
            .energy_records
            .values()
            .filter(|r| r.device_id == device_id && r.date >= start && r.date < end)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    async fn upsert_aggregation(&self, aggregation: &EnergyAggregation) -> Result<(), StoreError> {
        self.lock().aggregations.insert(
            (aggregation.device_id, aggregation.period_type, aggregation.period_start),
            aggregation.clone(),
        );
        Ok(())
    }

    async fn aggregation(
        &self,
        device_id: DeviceId,
        period_type: PeriodType,
        period_start: Date,
    ) -> Result<Option<EnergyAggregation>, StoreError> {
        Ok(self
            .lock()
            .aggregations
            .get(&(device_id, period_type, period_start))
            .cloned())
    }
}

#[async_trait]
impl SpikeStore for MemoryStore {
    async fn insert_spikes(&self, spikes: &[PowerSpike]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut added = 0;
        for spike in spikes {
            let stored = inner
                .spikes
                .iter()
                .any(|s| s.device_id == spike.device_id && s.ts == spike.ts);
            if !stored {
                inner.spikes.push(spike.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    async fn spikes_between(
        &self,
        device_id: DeviceId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<PowerSpike>, StoreError> {
        let mut rows: Vec<PowerSpike> = self
            .lock()
            .spikes
            .iter()
            .filter(|s| s.device_id == device_id && s.ts >= start && s.ts < end)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.ts);
        Ok(rows)
    }

    async fn upsert_weekly_analysis(&self, analysis: &WeeklySpikeAnalysis) -> Result<(), StoreError> {
        self.lock()
            .weekly
            .insert((analysis.device_id, analysis.week_start), analysis.clone());
        Ok(())
    }

    async fn weekly_analysis(
        &self,
        device_id: DeviceId,
        week_start: Date,
    ) -> Result<Option<WeeklySpikeAnalysis>, StoreError> {
        Ok(self.lock().weekly.get(&(device_id, week_start)).cloned())
    }
}

#[async_trait]
impl SystemLogStore for MemoryStore {
    async fn append_logs(&self, entries: &[SystemLogEntry]) -> Result<(), StoreError> {
        self.lock().logs.extend_from_slice(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn duplicate_readings_are_ignored() {
        let store = MemoryStore::new();
        let r = Reading::new(1, datetime!(2024-01-01 00:00:00 UTC), 230.0, 1.0);
        assert_eq!(store.insert_readings(&[r.clone(), r.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_readings(&[r]).await.unwrap(), 0);
        assert_eq!(store.reading_count(), 1);
    }

    #[tokio::test]
    async fn recent_readings_are_newest_first_and_limited() {
        let store = MemoryStore::new();
        let readings: Vec<Reading> = (0..5)
            .map(|i| {
                Reading::new(
                    1,
                    datetime!(2024-01-01 00:00:00 UTC) + time::Duration::seconds(i * 10),
                    230.0,
                    i as f64,
                )
            })
            .collect();
        store.insert_readings(&readings).await.unwrap();
        store
            .insert_readings(&[Reading::new(2, datetime!(2024-01-02 00:00:00 UTC), 1.0, 1.0)])
            .await
            .unwrap();

        let recent = store.recent_readings(1, 3).await.unwrap();
        let currents: Vec<f64> = recent.iter().map(|r| r.current).collect();
        assert_eq!(currents, vec![4.0, 3.0, 2.0]);
    }

    #[tokio::test]
    async fn replacing_a_rate_closes_the_open_one() {
        let store = MemoryStore::new();
        store
            .replace_active_rate(RateKind::Cost, 10.0, datetime!(2024-01-01 00:00:00 UTC))
            .await
            .unwrap();
        store
            .replace_active_rate(RateKind::Cost, 12.0, datetime!(2024-01-05 00:00:00 UTC))
            .await
            .unwrap();

        let history = store.rate_history(RateKind::Cost).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].ended_at, Some(datetime!(2024-01-05 00:00:00 UTC)));
        assert_eq!(history[1].ended_at, None);
        assert!(store.rate_history(RateKind::Co2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_open_rate_is_not_inserted() {
        let store = MemoryStore::new();
        let open = NewRate {
            kind: RateKind::Cost,
            value: 10.0,
            effective_from: OffsetDateTime::UNIX_EPOCH,
            ended_at: None,
        };
        assert!(store.insert_rate(open.clone()).await.unwrap().is_some());
        assert!(store.insert_rate(open).await.unwrap().is_none());
        assert_eq!(store.rate_history(RateKind::Cost).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spikes_are_kept_once_per_device_and_instant() {
        let store = MemoryStore::new();
        let spike = PowerSpike {
            device_id: 1,
            ts: datetime!(2024-01-01 00:00:00 UTC),
            peak_power: 900.0,
            baseline_power: 100.0,
            spike_magnitude: 800.0,
            duration_seconds: 10,
        };
        assert_eq!(store.insert_spikes(&[spike.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_spikes(&[spike.clone()]).await.unwrap(), 0);

        let other_device = PowerSpike { device_id: 2, ..spike };
        assert_eq!(store.insert_spikes(&[other_device]).await.unwrap(), 1);
        assert_eq!(store.spikes().len(), 2);
    }

    #[tokio::test]
    async fn stored_event_ids_reports_only_known_readings() {
        let store = MemoryStore::new();
        let stored = Reading::new(1, datetime!(2024-01-01 00:00:00 UTC), 230.0, 1.0);
        let fresh = Reading::new(1, datetime!(2024-01-01 00:00:10 UTC), 230.0, 1.0);
        store.insert_readings(&[stored.clone()]).await.unwrap();

        let known = store
            .stored_event_ids(&[stored.event_id(), fresh.event_id()])
            .await
            .unwrap();
        assert_eq!(known, HashSet::from([stored.event_id()]));
    }
}

use std::sync::Arc;

use time::Date;

use super::rates::{start_of_day, RateBook};
use crate::analytics::energy::{daily_energy_record, daily_totals, energy_by_date, price};
use crate::analytics::AnalyticsConfig;
use crate::domain::{DeviceId, EnergyAggregation, EnergyMetrics, EnergyRecord, PeriodType, Reading};
use crate::error::AnalyticsError;
use crate::store::{DeviceRegistry, EnergyStore, ReadingStore};

/// Turns raw readings into daily records and period rollups priced with the
/// rates that applied on each date.
#[derive(Clone)]
pub struct EnergyAggregator {
    devices: Arc<dyn DeviceRegistry>,
    readings: Arc<dyn ReadingStore>,
    energy: Arc<dyn EnergyStore>,
    rates: RateBook,
    config: AnalyticsConfig,
}

impl EnergyAggregator {
    pub fn new(
        devices: Arc<dyn DeviceRegistry>,
        readings: Arc<dyn ReadingStore>,
        energy: Arc<dyn EnergyStore>,
        rates: RateBook,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            devices,
            readings,
            energy,
            rates,
            config,
        }
    }

    /// Computes and upserts the record for (device, date). Readings from other
    /// dates or with unusable values are skipped; with nothing left no record
    /// is written and `None` is returned.
    pub async fn aggregate_daily(
        &self,
        device_id: DeviceId,
        date: Date,
        readings: &[Reading],
    ) -> Result<Option<EnergyRecord>, AnalyticsError> {
        self.ensure_device(device_id).await?;

        let Some(totals) = daily_totals(date, readings, self.config.sampling_interval_secs) else {
            tracing::debug!(device_id, %date, "no usable readings, skipping daily aggregate");
            return Ok(None);
        };
        let rates = self.rates.rates_on(date).await?;
        let record = daily_energy_record(device_id, date, totals, rates);

        self.energy.upsert_energy_record(&record).await?;

        tracing::info!(
            device_id,
            %date,
            samples = totals.samples,
            energy_kwh = record.total_energy_kwh,
            peak_power_w = record.peak_power_w,
            cost = record.cost_estimate,
            co2_kg = record.carbon_emission_kgco2,
            "energy record upserted"
        );

        Ok(Some(record))
    }

    /// Re-aggregates a date from every stored reading of that date.
    pub async fn recompute_daily(
        &self,
        device_id: DeviceId,
        date: Date,
    ) -> Result<Option<EnergyRecord>, AnalyticsError> {
        let Some(next) = date.next_day() else {
            return Ok(None);
        };
        let readings = self
            .readings
            .readings_between(device_id, start_of_day(date), start_of_day(next))
            .await?;
        self.aggregate_daily(device_id, date, &readings).await
    }

    /// Energy, cost and CO2 over readings that may span several dates. Each
    /// date is priced with the rates in effect on that date.
    pub async fn metrics_for_readings(&self, readings: &[Reading]) -> Result<EnergyMetrics, AnalyticsError> {
        let mut total = EnergyMetrics::default();
        for (date, energy_kwh) in energy_by_date(readings, self.config.sampling_interval_secs) {
            let rates = self.rates.rates_on(date).await?;
            total += price(energy_kwh, rates);
        }
        Ok(total)
    }

    /// Computes and upserts the rollup for the period containing `date` from
    /// the daily records of that period, each date priced with its own rates.
    /// `None` when the device has no daily record in the period.
    pub async fn rollup_period(
        &self,
        device_id: DeviceId,
        period_type: PeriodType,
        date: Date,
    ) -> Result<Option<EnergyAggregation>, AnalyticsError> {
        self.ensure_device(device_id).await?;

        let Some((start, end)) = period_type.bounds(date) else {
            return Ok(None);
        };
        let days = self.energy.energy_records_between(device_id, start, end).await?;
        if days.is_empty() {
            return Ok(None);
        }

        let mut totals = EnergyMetrics::default();
        let mut peak_power_w: f64 = 0.0;
        for day in &days {
            let rates = self.rates.rates_on(day.date).await?;
            totals += price(day.total_energy_kwh, rates);
            peak_power_w = peak_power_w.max(day.peak_power_w);
        }

        let aggregation = EnergyAggregation {
            device_id,
            period_start: start,
            period_type,
            total_energy_kwh: totals.energy_kwh,
            peak_power_w,
            total_cost: totals.cost,
            total_co2: totals.co2,
        };
        self.energy.upsert_aggregation(&aggregation).await?;

        tracing::info!(
            device_id,
            period = period_type.as_str(),
            period_start = %start,
            energy_kwh = aggregation.total_energy_kwh,
            "energy aggregation upserted"
        );

        Ok(Some(aggregation))
    }

    async fn ensure_device(&self, device_id: DeviceId) -> Result<(), AnalyticsError> {
        match self.devices.find_device(device_id).await? {
            Some(_) => Ok(()),
            None => Err(AnalyticsError::DeviceNotFound(device_id)),
        }
    }
}

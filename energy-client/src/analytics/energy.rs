//! Pure energy arithmetic. Rate lookups and persistence live in
//! [`crate::services`].

use std::collections::BTreeMap;

use time::Date;

use crate::domain::{DeviceId, EnergyMetrics, EnergyRecord, Rates, Reading};

const WATT_SECONDS_PER_KWH: f64 = 1000.0 * 3600.0;

/// Energy in kWh delivered by `power_w` held for `interval_secs`.
pub fn reading_energy_kwh(power_w: f64, interval_secs: f64) -> f64 {
    power_w * interval_secs / WATT_SECONDS_PER_KWH
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyTotals {
    pub energy_kwh: f64,
    pub peak_power_w: f64,
    pub samples: usize,
}

/// Sums the samples that belong to `date`. Samples from other dates and
/// malformed samples are ignored; `None` when nothing is left.
pub fn daily_totals(date: Date, readings: &[Reading], interval_secs: f64) -> Option<DailyTotals> {
    let mut power_sum = 0.0;
    let mut peak = 0.0f64;
    let mut samples = 0usize;

    for r in readings
        .iter()
        .filter(|r| r.is_well_formed() && r.date() == date)
    {
        let power = r.power_w();
        power_sum += power;
        peak = peak.max(power);
        samples += 1;
    }

    if samples == 0 {
        return None;
    }

    Some(DailyTotals {
        energy_kwh: reading_energy_kwh(power_sum, interval_secs),
        peak_power_w: peak,
        samples,
    })
}

/// Prices an amount of energy with the given rates.
pub fn price(energy_kwh: f64, rates: Rates) -> EnergyMetrics {
    EnergyMetrics {
        energy_kwh,
        cost: energy_kwh * rates.cost_per_kwh,
        co2: energy_kwh * rates.co2_factor,
    }
}

pub fn daily_energy_record(
    device_id: DeviceId,
    date: Date,
    totals: DailyTotals,
    rates: Rates,
) -> EnergyRecord {
    let priced = price(totals.energy_kwh, rates);
    EnergyRecord {
        device_id,
        date,
        total_energy_kwh: totals.energy_kwh,
        peak_power_w: totals.peak_power_w,
        cost_estimate: priced.cost,
        carbon_emission_kgco2: priced.co2,
    }
}

/// Energy per calendar date, so each date can be priced with its own rate.
pub fn energy_by_date(readings: &[Reading], interval_secs: f64) -> BTreeMap<Date, f64> {
    let mut by_date: BTreeMap<Date, f64> = BTreeMap::new();
    for r in readings.iter().filter(|r| r.is_well_formed()) {
        *by_date.entry(r.date()).or_default() += reading_energy_kwh(r.power_w(), interval_secs);
    }
    by_date
}

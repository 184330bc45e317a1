use time::{Date, OffsetDateTime};

use super::reading::DeviceId;

/// A reading whose power exceeded the device's spike threshold.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PowerSpike {
    pub device_id: DeviceId,
    pub ts: OffsetDateTime,
    pub peak_power: f64,
    pub baseline_power: f64,
    pub spike_magnitude: f64,
    pub duration_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WeeklySpikeAnalysis {
    pub device_id: DeviceId,
    pub week_start: Date,
    pub week_end: Date,
    pub spike_count: i64,
    pub max_spike_power: f64,
    pub avg_baseline_power: f64,
    pub spike_threshold: f64,
    pub total_spike_duration_minutes: i64,
    pub interpretation: String,
}

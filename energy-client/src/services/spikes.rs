use std::sync::Arc;

use serde_json::json;
use time::{Date, Duration, OffsetDateTime};

use super::rates::start_of_day;
use crate::analytics::spike::{detect, summarize_week, Baseline};
use crate::analytics::AnalyticsConfig;
use crate::domain::{DeviceId, LogType, PowerSpike, Reading, SystemLogEntry, WeeklySpikeAnalysis};
use crate::error::AnalyticsError;
use crate::store::{DeviceRegistry, ReadingStore, SpikeStore, SystemLogStore};

/// Real-time spike detection and the weekly spike summary.
#[derive(Clone)]
pub struct SpikeAnalyzer {
    devices: Arc<dyn DeviceRegistry>,
    readings: Arc<dyn ReadingStore>,
    spikes: Arc<dyn SpikeStore>,
    logs: Arc<dyn SystemLogStore>,
    config: AnalyticsConfig,
}

impl SpikeAnalyzer {
    pub fn new(
        devices: Arc<dyn DeviceRegistry>,
        readings: Arc<dyn ReadingStore>,
        spikes: Arc<dyn SpikeStore>,
        logs: Arc<dyn SystemLogStore>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            devices,
            readings,
            spikes,
            logs,
            config,
        }
    }

    /// Compares `new_readings` against the baseline of the device's stored
    /// history. Must run before the batch itself is stored; readings that are
    /// already stored are skipped. Returns no spikes while the device has too
    /// little history.
    pub async fn detect_spikes(
        &self,
        device_id: DeviceId,
        new_readings: &[Reading],
    ) -> Result<Vec<PowerSpike>, AnalyticsError> {
        self.ensure_device(device_id).await?;

        // Replayed readings are already part of the history.
        let ids: Vec<String> = new_readings.iter().map(Reading::event_id).collect();
        let stored = self.readings.stored_event_ids(&ids).await?;
        let fresh: Vec<Reading> = new_readings
            .iter()
            .zip(&ids)
            .filter(|(_, id)| !stored.contains(*id))
            .map(|(r, _)| r.clone())
            .collect();
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let history = self
            .readings
            .recent_readings(device_id, self.config.baseline_window)
            .await?;
        let Some(baseline) = Baseline::from_history(&history, self.config.min_baseline_readings) else {
            tracing::debug!(
                device_id,
                history = history.len(),
                "not enough history for a baseline, skipping spike detection"
            );
            return Ok(Vec::new());
        };

        let threshold = baseline.threshold(self.config.spike_threshold_multiplier);
        let spikes = detect(&baseline, &fresh, &self.config);
        if spikes.is_empty() {
            return Ok(spikes);
        }

        self.spikes.insert_spikes(&spikes).await?;

        let entries: Vec<SystemLogEntry> = spikes
            .iter()
            .map(|s| {
                tracing::info!(
                    device_id,
                    ts = %s.ts,
                    peak_power = s.peak_power,
                    baseline_power = s.baseline_power,
                    threshold,
                    "power spike detected"
                );
                SystemLogEntry {
                    log_type: LogType::SpikeDetected,
                    device_id,
                    message: format!(
                        "Power spike detected: {:.2}W (baseline: {:.2}W)",
                        s.peak_power, s.baseline_power
                    ),
                    metadata: json!({
                        "peak_power": s.peak_power,
                        "baseline_power": s.baseline_power,
                        "spike_magnitude": s.spike_magnitude,
                        "threshold": threshold,
                    }),
                    ts: s.ts,
                }
            })
            .collect();
        self.logs.append_logs(&entries).await?;

        Ok(spikes)
    }

    /// Builds and upserts the analysis for the week starting at `week_start`.
    pub async fn generate_weekly_analysis(
        &self,
        device_id: DeviceId,
        week_start: Date,
    ) -> Result<WeeklySpikeAnalysis, AnalyticsError> {
        self.ensure_device(device_id).await?;

        let start = start_of_day(week_start);
        let end = start + Duration::days(7);
        let spikes = self.spikes.spikes_between(device_id, start, end).await?;

        let analysis = summarize_week(device_id, week_start, &spikes, &self.config);
        self.spikes.upsert_weekly_analysis(&analysis).await?;

        tracing::info!(
            device_id,
            %week_start,
            spike_count = analysis.spike_count,
            "weekly spike analysis upserted"
        );

        Ok(analysis)
    }

    async fn ensure_device(&self, device_id: DeviceId) -> Result<(), AnalyticsError> {
        match self.devices.find_device(device_id).await? {
            Some(_) => Ok(()),
            None => Err(AnalyticsError::DeviceNotFound(device_id)),
        }
    }
}

/// Week analysed by the scheduled job when no start is given: the seven days
/// ending yesterday.
pub fn default_week_start(now: OffsetDateTime) -> Date {
    now.to_offset(time::UtcOffset::UTC).date() - Duration::days(7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::spike::{STABLE_WEEK_MESSAGE, STAGGERED_STARTUP_RECOMMENDATION};
    use crate::domain::{Device, DeviceStatus};
    use crate::store::MemoryStore;
    use time::macros::{date, datetime};

    fn setup() -> (Arc<MemoryStore>, SpikeAnalyzer) {
        let store = Arc::new(MemoryStore::with_devices([Device::new(5, None, DeviceStatus::Active)]));
        let analyzer = SpikeAnalyzer::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            AnalyticsConfig::default(),
        );
        (store, analyzer)
    }

    fn at(offset_secs: i64) -> OffsetDateTime {
        datetime!(2024-02-05 08:00:00 UTC) + Duration::seconds(offset_secs)
    }

    /// Alternating 90 W / 110 W history: mean 100 W, sample sd just over 10 W.
    async fn seed_history(store: &MemoryStore, count: usize) {
        let history: Vec<Reading> = (0..count)
            .map(|i| {
                let watts = if i % 2 == 0 { 90.0 } else { 110.0 };
                Reading::new(5, at(10 * i as i64), 100.0, watts / 100.0)
            })
            .collect();
        store.insert_readings(&history).await.unwrap();
    }

    #[tokio::test]
    async fn short_history_never_flags() {
        let (store, analyzer) = setup();
        seed_history(&store, 9).await;
        let extreme = [Reading::new(5, at(1000), 230.0, 50.0)];
        let spikes = analyzer.detect_spikes(5, &extreme).await.unwrap();
        assert!(spikes.is_empty());
        assert!(store.spikes().is_empty());
    }

    #[tokio::test]
    async fn spikes_are_stored_and_logged() {
        let (store, analyzer) = setup();
        seed_history(&store, 30).await;
        let batch = [
            Reading::new(5, at(1000), 100.0, 1.05),
            Reading::new(5, at(1010), 100.0, 5.0),
        ];
        let spikes = analyzer.detect_spikes(5, &batch).await.unwrap();

        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].ts, at(1010));
        assert!((spikes[0].baseline_power - 100.0).abs() < 1e-9);
        assert!((spikes[0].spike_magnitude - 400.0).abs() < 1e-9);
        assert_eq!(store.spikes(), spikes);

        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::SpikeDetected);
        assert_eq!(logs[0].message, "Power spike detected: 500.00W (baseline: 100.00W)");
    }

    #[tokio::test]
    async fn already_stored_readings_are_not_flagged_again() {
        let (store, analyzer) = setup();
        seed_history(&store, 30).await;
        let batch = [Reading::new(5, at(1010), 100.0, 5.0)];

        assert_eq!(analyzer.detect_spikes(5, &batch).await.unwrap().len(), 1);
        store.insert_readings(&batch).await.unwrap();

        assert!(analyzer.detect_spikes(5, &batch).await.unwrap().is_empty());
        assert_eq!(store.spikes().len(), 1);
        assert_eq!(store.logs().len(), 1);
    }

    #[tokio::test]
    async fn baseline_uses_only_the_most_recent_window() {
        let (store, analyzer) = setup();
        // Old, very high readings fall outside the 30-reading window.
        let old: Vec<Reading> = (0..20)
            .map(|i| Reading::new(5, at(-100_000 + i), 100.0, 50.0))
            .collect();
        store.insert_readings(&old).await.unwrap();
        seed_history(&store, 30).await;

        let spikes = analyzer
            .detect_spikes(5, &[Reading::new(5, at(2000), 100.0, 2.0)])
            .await
            .unwrap();
        assert_eq!(spikes.len(), 1);
    }

    #[tokio::test]
    async fn unknown_device_is_reported() {
        let (_, analyzer) = setup();
        let err = analyzer.detect_spikes(42, &[]).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::DeviceNotFound(42)));
        let err = analyzer
            .generate_weekly_analysis(42, date!(2024 - 02 - 05))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::DeviceNotFound(42)));
    }

    #[tokio::test]
    async fn weekly_analysis_is_idempotent() {
        let (store, analyzer) = setup();
        let spikes: Vec<PowerSpike> = (0..20)
            .map(|i| PowerSpike {
                device_id: 5,
                ts: at(i * 3600),
                peak_power: if i == 0 { 400.0 } else { 150.0 },
                baseline_power: 100.0,
                spike_magnitude: 50.0,
                duration_seconds: 10,
            })
            .collect();
        store.insert_spikes(&spikes).await.unwrap();

        let first = analyzer
            .generate_weekly_analysis(5, date!(2024 - 02 - 05))
            .await
            .unwrap();
        let second = analyzer
            .generate_weekly_analysis(5, date!(2024 - 02 - 05))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.spike_count, 20);
        assert!(first.interpretation.contains("investigate potential issues"));
        assert!(first.interpretation.contains("check for equipment malfunctions"));
        assert!(first.interpretation.ends_with(STAGGERED_STARTUP_RECOMMENDATION));
        assert_eq!(
            store.weekly_analysis(5, date!(2024 - 02 - 05)).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn empty_week_is_stored_as_stable() {
        let (store, analyzer) = setup();
        let a = analyzer
            .generate_weekly_analysis(5, date!(2024 - 02 - 12))
            .await
            .unwrap();
        assert_eq!(a.spike_count, 0);
        assert_eq!(a.interpretation, STABLE_WEEK_MESSAGE);
        assert!(store.weekly_analysis(5, date!(2024 - 02 - 12)).await.unwrap().is_some());
    }

    #[test]
    fn default_week_is_the_previous_seven_days() {
        assert_eq!(
            default_week_start(datetime!(2024-02-12 15:00:00 UTC)),
            date!(2024 - 02 - 05)
        );
    }
}

//! Baseline statistics, spike detection and the weekly spike summary.

use time::{Date, Duration};

use super::config::AnalyticsConfig;
use super::stats::{mean, sample_std_dev};
use crate::domain::{DeviceId, PowerSpike, Reading, WeeklySpikeAnalysis};

pub const STABLE_WEEK_MESSAGE: &str =
    "No power spikes detected this week. Energy consumption appears stable.";
pub const STAGGERED_STARTUP_RECOMMENDATION: &str =
    "Recommendation: Review equipment schedules and consider staggered startup times.";

/// Power statistics over a device's recent history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

impl Baseline {
    /// `None` when fewer than `min_samples` well-formed readings are available.
    pub fn from_history(history: &[Reading], min_samples: usize) -> Option<Self> {
        let powers: Vec<f64> = history
            .iter()
            .filter(|r| r.is_well_formed())
            .map(Reading::power_w)
            .collect();

        // The emptiness check only matters when `min_samples` is zero.
        if powers.is_empty() || powers.len() < min_samples {
            return None;
        }

        Some(Self {
            mean: mean(&powers)?,
            std_dev: sample_std_dev(&powers)?,
            samples: powers.len(),
        })
    }

    /// A zero spread puts the threshold at the mean itself.
    pub fn threshold(&self, multiplier: f64) -> f64 {
        self.mean + multiplier * self.std_dev
    }
}

/// Readings strictly above the baseline threshold, as spikes.
pub fn detect(baseline: &Baseline, readings: &[Reading], config: &AnalyticsConfig) -> Vec<PowerSpike> {
    let threshold = baseline.threshold(config.spike_threshold_multiplier);

    readings
        .iter()
        .filter(|r| r.is_well_formed())
        .filter(|r| r.power_w() > threshold)
        .map(|r| {
            let power = r.power_w();
            PowerSpike {
                device_id: r.device_id,
                ts: r.ts,
                peak_power: power,
                baseline_power: baseline.mean,
                spike_magnitude: power - baseline.mean,
                duration_seconds: config.spike_duration_secs,
            }
        })
        .collect()
}

/// Builds the weekly analysis for `[week_start, week_start + 6 days]` from the
/// given spikes. Spikes outside the window are ignored, so the result only
/// depends on the spikes inside it.
pub fn summarize_week(
    device_id: DeviceId,
    week_start: Date,
    spikes: &[PowerSpike],
    config: &AnalyticsConfig,
) -> WeeklySpikeAnalysis {
    let week_end = week_start + Duration::days(6);
    let in_week: Vec<&PowerSpike> = spikes
        .iter()
        .filter(|s| {
            let day = s.ts.to_offset(time::UtcOffset::UTC).date();
            s.device_id == device_id && day >= week_start && day <= week_end
        })
        .collect();

    if in_week.is_empty() {
        return WeeklySpikeAnalysis {
            device_id,
            week_start,
            week_end,
            spike_count: 0,
            max_spike_power: 0.0,
            avg_baseline_power: 0.0,
            spike_threshold: 0.0,
            total_spike_duration_minutes: 0,
            interpretation: STABLE_WEEK_MESSAGE.to_string(),
        };
    }

    let spike_count = in_week.len() as i64;
    let max_spike_power = in_week
        .iter()
        .map(|s| s.peak_power)
        .fold(f64::NEG_INFINITY, f64::max);
    let baselines: Vec<f64> = in_week.iter().map(|s| s.baseline_power).collect();
    let avg_baseline_power = mean(&baselines).unwrap_or(0.0);
    let total_duration_secs = spike_count * config.spike_duration_secs as i64;

    WeeklySpikeAnalysis {
        device_id,
        week_start,
        week_end,
        spike_count,
        max_spike_power,
        avg_baseline_power,
        spike_threshold: avg_baseline_power * config.spike_threshold_multiplier,
        total_spike_duration_minutes: total_duration_secs / 60,
        interpretation: interpret(spike_count, max_spike_power, avg_baseline_power, total_duration_secs),
    }
}

/// Human-readable summary built from frequency, magnitude and duration.
pub fn interpret(spike_count: i64, max_spike: f64, avg_baseline: f64, total_duration_secs: i64) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(4);

    parts.push(match spike_count {
        0 => "No power spikes detected - excellent energy stability.".to_string(),
        1..=5 => format!("Low spike activity ({spike_count} spikes) - normal operation."),
        6..=15 => format!("Moderate spike activity ({spike_count} spikes) - monitor equipment usage."),
        _ => format!("High spike activity ({spike_count} spikes) - investigate potential issues."),
    });

    if max_spike != 0.0 && avg_baseline != 0.0 {
        let ratio = max_spike / avg_baseline;
        if ratio > 3.0 {
            parts.push(format!(
                "Severe power spike detected ({max_spike:.1}W vs {avg_baseline:.1}W baseline) - check for equipment malfunctions."
            ));
        } else if ratio > 2.0 {
            parts.push(format!(
                "Significant power spike ({max_spike:.1}W) - review high-power equipment usage."
            ));
        } else {
            parts.push("Minor power variations detected - within acceptable range.".to_string());
        }
    }

    let minutes = total_duration_secs / 60;
    if minutes > 60 {
        parts.push(format!(
            "Extended spike duration ({minutes} minutes total) - consider load balancing."
        ));
    } else if minutes > 10 {
        parts.push(format!(
            "Moderate spike duration ({minutes} minutes) - normal for equipment startup."
        ));
    }

    if spike_count > 10 {
        parts.push(STAGGERED_STARTUP_RECOMMENDATION.to_string());
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};
    use time::OffsetDateTime;

    fn reading_at(power: f64, ts: OffsetDateTime) -> Reading {
        Reading::new(3, ts, 100.0, power / 100.0)
    }

    fn spike(ts: OffsetDateTime, peak: f64, baseline: f64) -> PowerSpike {
        PowerSpike {
            device_id: 3,
            ts,
            peak_power: peak,
            baseline_power: baseline,
            spike_magnitude: peak - baseline,
            duration_seconds: 10,
        }
    }

    #[test]
    fn threshold_boundary_is_strict() {
        let baseline = Baseline {
            mean: 100.0,
            std_dev: 10.0,
            samples: 30,
        };
        let cfg = AnalyticsConfig::default();
        let at = datetime!(2024-02-01 10:00:00 UTC);

        let exact = Reading::new(3, at, 120.0, 1.0);
        assert!(detect(&baseline, &[exact], &cfg).is_empty());

        let above = Reading::new(3, at, 120.01, 1.0);
        let spikes = detect(&baseline, &[above], &cfg);
        assert_eq!(spikes.len(), 1);
        assert!((spikes[0].peak_power - 120.01).abs() < 1e-9);
        assert_eq!(spikes[0].baseline_power, 100.0);
        assert!((spikes[0].spike_magnitude - 20.01).abs() < 1e-9);
        assert_eq!(spikes[0].duration_seconds, 10);
    }

    #[test]
    fn baseline_needs_minimum_history() {
        let at = datetime!(2024-02-01 10:00:00 UTC);
        let history: Vec<Reading> = (0..9).map(|_| reading_at(100.0, at)).collect();
        assert_eq!(Baseline::from_history(&history, 10), None);

        let history: Vec<Reading> = (0..10).map(|_| reading_at(100.0, at)).collect();
        let b = Baseline::from_history(&history, 10).unwrap();
        assert_eq!(b.samples, 10);
        assert!((b.mean - 100.0).abs() < 1e-9);
    }

    #[test]
    fn flat_baseline_flags_anything_above_mean() {
        let at = datetime!(2024-02-01 10:00:00 UTC);
        let history: Vec<Reading> = (0..30).map(|_| Reading::new(3, at, 200.0, 0.5)).collect();
        let b = Baseline::from_history(&history, 10).unwrap();
        assert_eq!(b.std_dev, 0.0);
        assert_eq!(b.threshold(2.0), 100.0);

        let cfg = AnalyticsConfig::default();
        let readings = [Reading::new(3, at, 200.0, 0.5), Reading::new(3, at, 200.0, 0.5001)];
        assert_eq!(detect(&b, &readings, &cfg).len(), 1);
    }

    #[test]
    fn empty_week_is_stable() {
        let cfg = AnalyticsConfig::default();
        let a = summarize_week(3, date!(2024 - 02 - 05), &[], &cfg);
        assert_eq!(a.spike_count, 0);
        assert_eq!(a.max_spike_power, 0.0);
        assert_eq!(a.avg_baseline_power, 0.0);
        assert_eq!(a.spike_threshold, 0.0);
        assert_eq!(a.total_spike_duration_minutes, 0);
        assert_eq!(a.week_end, date!(2024 - 02 - 11));
        assert_eq!(a.interpretation, STABLE_WEEK_MESSAGE);
    }

    #[test]
    fn busy_week_composes_interpretation() {
        let cfg = AnalyticsConfig::default();
        let start = datetime!(2024-02-05 06:00:00 UTC);
        let mut spikes: Vec<PowerSpike> = (0..19)
            .map(|i| spike(start + Duration::minutes(i), 150.0, 100.0))
            .collect();
        spikes.push(spike(start + Duration::hours(30), 400.0, 100.0));

        let a = summarize_week(3, date!(2024 - 02 - 05), &spikes, &cfg);
        assert_eq!(a.spike_count, 20);
        assert_eq!(a.max_spike_power, 400.0);
        assert_eq!(a.avg_baseline_power, 100.0);
        assert_eq!(a.spike_threshold, 200.0);
        assert_eq!(a.total_spike_duration_minutes, 3);

        assert!(a.interpretation.contains("High spike activity (20 spikes) - investigate"));
        assert!(a.interpretation.contains("Severe power spike detected (400.0W vs 100.0W baseline)"));
        assert!(a.interpretation.contains("check for equipment malfunctions"));
        assert!(a.interpretation.ends_with(STAGGERED_STARTUP_RECOMMENDATION));
        assert!(!a.interpretation.contains("duration"));
    }

    #[test]
    fn spikes_outside_the_window_are_ignored() {
        let cfg = AnalyticsConfig::default();
        let spikes = vec![
            spike(datetime!(2024-02-04 23:59:59 UTC), 900.0, 100.0),
            spike(datetime!(2024-02-05 00:00:00 UTC), 180.0, 100.0),
            spike(datetime!(2024-02-11 23:59:59 UTC), 250.0, 100.0),
            spike(datetime!(2024-02-12 00:00:00 UTC), 900.0, 100.0),
        ];
        let a = summarize_week(3, date!(2024 - 02 - 05), &spikes, &cfg);
        assert_eq!(a.spike_count, 2);
        assert_eq!(a.max_spike_power, 250.0);
        assert_eq!(
            a.interpretation,
            "Low spike activity (2 spikes) - normal operation. \
             Significant power spike (250.0W) - review high-power equipment usage."
        );
    }

    #[test]
    fn duration_tiers() {
        assert!(interpret(70, 150.0, 100.0, 700).contains("Moderate spike duration (11 minutes)"));
        assert!(interpret(400, 150.0, 100.0, 4000).contains("Extended spike duration (66 minutes total)"));
        assert!(!interpret(60, 150.0, 100.0, 600).contains("spike duration"));
        assert!(interpret(3, 150.0, 100.0, 30).contains("Minor power variations"));
    }

    #[test]
    fn magnitude_tier_needs_a_baseline() {
        assert_eq!(
            interpret(2, 150.0, 0.0, 20),
            "Low spike activity (2 spikes) - normal operation."
        );
        assert_eq!(
            interpret(0, 0.0, 0.0, 0),
            "No power spikes detected - excellent energy stability."
        );
    }

    #[test]
    fn summary_is_deterministic() {
        let cfg = AnalyticsConfig::default();
        let spikes: Vec<PowerSpike> = (0..8)
            .map(|i| spike(datetime!(2024-02-06 12:00:00 UTC) + Duration::minutes(i), 320.0, 110.0))
            .collect();
        let first = summarize_week(3, date!(2024 - 02 - 05), &spikes, &cfg);
        let second = summarize_week(3, date!(2024 - 02 - 05), &spikes, &cfg);
        assert_eq!(first, second);
    }
}

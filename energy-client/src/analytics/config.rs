use serde::Deserialize;

/// Tunables for aggregation and spike detection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Seconds between two device samples.
    pub sampling_interval_secs: f64,
    /// Number of most recent stored readings used for the baseline.
    pub baseline_window: usize,
    /// Below this many history readings detection is skipped.
    pub min_baseline_readings: usize,
    pub spike_threshold_multiplier: f64,
    /// Duration attributed to each detected spike.
    pub spike_duration_secs: i32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            sampling_interval_secs: 10.0,
            baseline_window: 30,
            min_baseline_readings: 10,
            spike_threshold_multiplier: 2.0,
            spike_duration_secs: 10,
        }
    }
}

impl AnalyticsConfig {
    /// Rejects values that would make aggregation or detection meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.sampling_interval_secs.is_finite() && self.sampling_interval_secs > 0.0) {
            return Err(format!(
                "sampling_interval_secs must be positive, got {}",
                self.sampling_interval_secs
            ));
        }
        if self.min_baseline_readings == 0 {
            return Err("min_baseline_readings must be at least 1".to_string());
        }
        if self.baseline_window < self.min_baseline_readings {
            return Err(format!(
                "baseline_window ({}) is smaller than min_baseline_readings ({})",
                self.baseline_window, self.min_baseline_readings
            ));
        }
        Ok(())
    }
}

/// Values used when a rate lookup finds no record for a date.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateDefaults {
    pub default_cost_per_kwh: f64,
    pub default_co2_factor: f64,
}

impl Default for RateDefaults {
    fn default() -> Self {
        Self {
            default_cost_per_kwh: 10.0,
            default_co2_factor: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_remaining_defaults() {
        let cfg: AnalyticsConfig =
            serde_json::from_str(r#"{"spike_threshold_multiplier": 3.0}"#).unwrap();
        assert_eq!(cfg.spike_threshold_multiplier, 3.0);
        assert_eq!(cfg.baseline_window, 30);
        assert_eq!(cfg.min_baseline_readings, 10);
        assert_eq!(cfg.sampling_interval_secs, 10.0);
    }

    #[test]
    fn empty_baseline_requirement_is_rejected() {
        assert!(AnalyticsConfig::default().validate().is_ok());

        let cfg = AnalyticsConfig {
            min_baseline_readings: 0,
            ..AnalyticsConfig::default()
        };
        assert!(cfg.validate().unwrap_err().contains("min_baseline_readings"));

        let cfg = AnalyticsConfig {
            sampling_interval_secs: 0.0,
            ..AnalyticsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

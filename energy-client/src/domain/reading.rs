use time::{Date, OffsetDateTime};

pub type DeviceId = i32;

/// One voltage/current sample from a device.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Reading {
    pub device_id: DeviceId,
    pub ts: OffsetDateTime,
    pub voltage: f64,
    pub current: f64,
}

impl Reading {
    pub fn new(device_id: DeviceId, ts: OffsetDateTime, voltage: f64, current: f64) -> Self {
        Self {
            device_id,
            ts,
            voltage,
            current,
        }
    }

    /// Instantaneous power in watts.
    pub fn power_w(&self) -> f64 {
        self.voltage * self.current
    }

    /// Calendar date of the sample in UTC.
    pub fn date(&self) -> Date {
        self.ts.to_offset(time::UtcOffset::UTC).date()
    }

    pub fn is_well_formed(&self) -> bool {
        self.voltage.is_finite() && self.current.is_finite()
    }

    /// Stable digest of the sample, used by stores to ignore re-ingested rows.
    pub fn event_id(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&self.device_id.to_le_bytes());
        h.update(&self.ts.unix_timestamp_nanos().to_le_bytes());
        h.update(&self.voltage.to_bits().to_le_bytes());
        h.update(&self.current.to_bits().to_le_bytes());
        h.finalize().to_hex().to_string()
    }
}

/// Readings from one device, as delivered by one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingBatch {
    pub device_id: DeviceId,
    pub readings: Vec<Reading>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn power_and_date_follow_the_sample() {
        let r = Reading::new(1, datetime!(2024-03-05 23:59:50 UTC), 230.0, 2.0);
        assert_eq!(r.power_w(), 460.0);
        assert_eq!(r.date(), date!(2024 - 03 - 05));
    }

    #[test]
    fn date_is_taken_in_utc() {
        let r = Reading::new(1, datetime!(2024-03-06 01:00:00 +02:00), 230.0, 1.0);
        assert_eq!(r.date(), date!(2024 - 03 - 05));
    }

    #[test]
    fn event_id_distinguishes_samples() {
        let a = Reading::new(1, datetime!(2024-01-01 00:00:00 UTC), 230.0, 1.0);
        let b = Reading::new(1, datetime!(2024-01-01 00:00:10 UTC), 230.0, 1.0);
        assert_eq!(a.event_id(), a.clone().event_id());
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn nan_current_is_malformed() {
        let r = Reading::new(1, datetime!(2024-01-01 00:00:00 UTC), 230.0, f64::NAN);
        assert!(!r.is_well_formed());
    }
}

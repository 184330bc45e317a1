use energy_client::domain::{Reading, ReadingBatch};
use time::{macros::datetime, OffsetDateTime};

use crate::pipeline::{Envelope, PipelineError, Transform};

const MIN_TS: OffsetDateTime = datetime!(2000-01-01 00:00:00 UTC);
const MAX_TS: OffsetDateTime = datetime!(2100-01-01 00:00:00 UTC);

/// Why a single reading was dropped.
pub fn reading_rejection(r: &Reading) -> Option<&'static str> {
    if !r.is_well_formed() {
        return Some("non-finite voltage or current");
    }
    if r.voltage < 0.0 || r.current < 0.0 {
        return Some("negative voltage or current");
    }
    if r.ts < MIN_TS || r.ts > MAX_TS {
        return Some("timestamp out of allowed range");
    }
    None
}

/// Pure validation of a device batch.
///
/// Rules:
/// - the device id must be positive, otherwise the whole batch is rejected.
/// - readings with non-finite or negative voltage/current, or a timestamp
///   outside [2000-01-01, 2100-01-01], are dropped.
/// - readings stamped with another device id are dropped.
///
/// Returns the surviving batch and the number of dropped readings.
pub fn validate_batch(
    env: Envelope<ReadingBatch>,
) -> Result<(Envelope<ReadingBatch>, usize), PipelineError> {
    let device_id = env.payload.device_id;
    if device_id <= 0 {
        return Err(PipelineError::Transform(format!("invalid device id {device_id}")));
    }

    let before = env.payload.readings.len();
    let Envelope {
        payload,
        received_at,
    } = env;
    let readings: Vec<Reading> = payload
        .readings
        .into_iter()
        .filter(|r| match reading_rejection(r) {
            Some(reason) => {
                tracing::debug!(device_id, ts = %r.ts, reason, "dropping reading");
                false
            }
            None => r.device_id == device_id,
        })
        .collect();
    let rejected = before - readings.len();

    Ok((
        Envelope {
            payload: ReadingBatch { device_id, readings },
            received_at,
        },
        rejected,
    ))
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<ReadingBatch, ReadingBatch> for ReadingValidation {
    async fn apply(&self, input: Envelope<ReadingBatch>) -> Result<Envelope<ReadingBatch>, PipelineError> {
        match validate_batch(input) {
            Ok((env, rejected)) => {
                if rejected > 0 {
                    metrics::counter!("validation_readings_rejected_total").increment(rejected as u64);
                }
                Ok(env)
            }
            Err(e) => {
                metrics::counter!("validation_batches_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn batch(device_id: i32, readings: Vec<Reading>) -> Envelope<ReadingBatch> {
        Envelope::new(ReadingBatch { device_id, readings })
    }

    #[test]
    fn valid_batch_passes_untouched() {
        let readings = vec![
            Reading::new(1, datetime!(2024-01-01 00:00:00 UTC), 230.0, 1.0),
            Reading::new(1, datetime!(2024-01-01 00:00:10 UTC), 230.0, 1.1),
        ];
        let (env, rejected) = validate_batch(batch(1, readings.clone())).unwrap();
        assert_eq!(rejected, 0);
        assert_eq!(env.payload.readings, readings);
    }

    #[test]
    fn bad_readings_are_dropped_and_counted() {
        let good = Reading::new(1, datetime!(2024-01-01 00:00:00 UTC), 230.0, 1.0);
        let readings = vec![
            good.clone(),
            Reading::new(1, datetime!(2024-01-01 00:00:10 UTC), f64::NAN, 1.0),
            Reading::new(1, datetime!(2024-01-01 00:00:20 UTC), 230.0, -0.5),
            Reading::new(1, datetime!(1800-01-01 00:00:00 UTC), 230.0, 1.0),
            Reading::new(2, datetime!(2024-01-01 00:00:30 UTC), 230.0, 1.0),
        ];
        let (env, rejected) = validate_batch(batch(1, readings)).unwrap();
        assert_eq!(rejected, 4);
        assert_eq!(env.payload.readings, vec![good]);
    }

    #[test]
    fn non_positive_device_id_rejects_the_batch() {
        let res = validate_batch(batch(0, Vec::new()));
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn empty_batch_is_passed_through() {
        let (env, rejected) = validate_batch(batch(3, Vec::new())).unwrap();
        assert_eq!(rejected, 0);
        assert!(env.payload.readings.is_empty());
    }
}

use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use energy_client::domain::{DeviceId, Reading, ReadingBatch};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// CSV backfill source for readings.
///
/// Expected header columns (by name):
/// - device_id
/// - timestamp (Unix seconds or RFC3339)
/// - voltage
/// - current
///
/// Consecutive rows of one device are grouped into a batch of at most
/// `max_batch_rows` readings. Unparseable rows are skipped and counted.
pub struct ReadingCsvFileSource {
    path: PathBuf,
    max_batch_rows: usize,
}

impl ReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, max_batch_rows: usize) -> Self {
        Self {
            path: path.into(),
            max_batch_rows: max_batch_rows.max(1),
        }
    }
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, String> {
    let s = s.trim();
    match s.parse::<f64>() {
        Ok(secs) if secs.is_finite() => {
            OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128).map_err(|e| e.to_string())
        }
        _ => OffsetDateTime::parse(s, &Rfc3339).map_err(|e| e.to_string()),
    }
}

fn record_to_reading(record: &StringRecord, headers: &StringRecord) -> Result<Reading, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };
    let number = |name: &str| -> Result<f64, PipelineError> {
        let raw = get(name)?;
        raw.parse()
            .map_err(|e| PipelineError::Source(format!("invalid {name} '{raw}': {e}")))
    };

    let device_raw = get("device_id")?;
    let device_id: DeviceId = device_raw
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid device_id '{device_raw}': {e}")))?;

    let ts_raw = get("timestamp")?;
    let ts = parse_timestamp(ts_raw)
        .map_err(|e| PipelineError::Source(format!("invalid timestamp '{ts_raw}': {e}")))?;

    Ok(Reading::new(device_id, ts, number("voltage")?, number("current")?))
}

/// Appends `reading` to `pending`, returning the finished batch when the
/// device changes or the batch is full.
fn push_grouped(
    pending: &mut Option<ReadingBatch>,
    reading: Reading,
    max_rows: usize,
) -> Option<ReadingBatch> {
    let mut done = None;
    if let Some(batch) = pending.as_ref() {
        if batch.device_id != reading.device_id || batch.readings.len() >= max_rows {
            done = pending.take();
        }
    }
    pending
        .get_or_insert_with(|| ReadingBatch {
            device_id: reading.device_id,
            readings: Vec::new(),
        })
        .readings
        .push(reading);
    done
}

#[async_trait::async_trait]
impl Source<ReadingBatch> for ReadingCsvFileSource {
    async fn stream(&self) -> EnvelopeStream<ReadingBatch> {
        // Blocking CSV reader wrapped in a single async task.
        let path = self.path.clone();
        let max_rows = self.max_batch_rows;
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();

            let mut pending: Option<ReadingBatch> = None;
            for (line, result) in rdr.records().enumerate() {
                let reading = match result
                    .map_err(|e| PipelineError::Source(format!("failed to read CSV record: {e}")))
                    .and_then(|record| record_to_reading(&record, &headers))
                {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("readings_skipped_total").increment(1);
                        tracing::warn!(error = %e, row = line + 1, "skipping CSV row");
                        continue;
                    }
                };

                if let Some(batch) = push_grouped(&mut pending, reading, max_rows) {
                    yield Envelope::new(batch);
                }
            }

            if let Some(batch) = pending {
                yield Envelope::new(batch);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use time::macros::datetime;

    #[test]
    fn timestamps_accept_unix_seconds_and_rfc3339() {
        assert_eq!(parse_timestamp("1698345600").unwrap(), datetime!(2023-10-26 18:40:00 UTC));
        assert_eq!(parse_timestamp("1698345600.5").unwrap(), datetime!(2023-10-26 18:40:00.5 UTC));
        assert_eq!(
            parse_timestamp("2023-10-26T18:40:00Z").unwrap(),
            datetime!(2023-10-26 18:40:00 UTC)
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn grouping_splits_on_device_change_and_size() {
        let ts = datetime!(2024-01-01 00:00:00 UTC);
        let mut pending = None;
        assert!(push_grouped(&mut pending, Reading::new(1, ts, 230.0, 1.0), 2).is_none());
        assert!(push_grouped(&mut pending, Reading::new(1, ts, 230.0, 1.0), 2).is_none());

        let full = push_grouped(&mut pending, Reading::new(1, ts, 230.0, 1.0), 2).unwrap();
        assert_eq!(full.readings.len(), 2);

        let switched = push_grouped(&mut pending, Reading::new(2, ts, 230.0, 1.0), 2).unwrap();
        assert_eq!(switched.device_id, 1);
        assert_eq!(switched.readings.len(), 1);
        assert_eq!(pending.unwrap().device_id, 2);
    }

    #[tokio::test]
    async fn csv_rows_become_device_batches() {
        let path = std::env::temp_dir().join(format!("readings-{}.csv", std::process::id()));
        let contents = "device_id,timestamp,voltage,current\n\
                        1,1698345600,230.0,1.0\n\
                        1,2023-10-26T18:40:10Z,231.0,1.1\n\
                        1,not-a-time,231.0,1.1\n\
                        2,1698345600,229.0,0.5\n";
        std::fs::write(&path, contents).unwrap();

        let items: Vec<_> = ReadingCsvFileSource::new(&path, 100).stream().await.collect().await;
        std::fs::remove_file(&path).unwrap();

        let batches: Vec<ReadingBatch> = items.into_iter().map(|i| i.unwrap().payload).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].device_id, 1);
        assert_eq!(batches[0].readings.len(), 2);
        assert_eq!(batches[1].device_id, 2);
        assert_eq!(batches[1].readings[0].voltage, 229.0);
    }
}

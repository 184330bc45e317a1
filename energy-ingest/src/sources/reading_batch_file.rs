use std::path::PathBuf;

use async_stream::stream;
use energy_client::domain::{DeviceId, Reading, ReadingBatch};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// NDJSON source of device uploads, one batch per line:
///
/// `{"device_id": 1, "reading_count": 2, "readings": [{"voltage": 230.5, "current": 2.45, "timestamp": 1698345600}, ...]}`
///
/// Readings missing a field (or carrying one of the wrong type) are skipped
/// and counted; a line that is not a batch at all yields an error item and
/// the stream moves on.
pub struct ReadingBatchFileSource {
    path: PathBuf,
}

impl ReadingBatchFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
struct IncomingBatch {
    device_id: DeviceId,
    #[serde(default)]
    reading_count: Option<usize>,
    #[serde(default)]
    readings: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct IncomingReading {
    voltage: Option<f64>,
    current: Option<f64>,
    /// Unix seconds; devices may send a fractional part.
    timestamp: Option<f64>,
}

impl IncomingReading {
    fn into_reading(self, device_id: DeviceId) -> Option<Reading> {
        let secs = self.timestamp.filter(|s| s.is_finite())?;
        let ts = OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128).ok()?;
        Some(Reading::new(device_id, ts, self.voltage?, self.current?))
    }
}

/// Parses one line into a batch plus the number of skipped readings.
fn parse_line(line: &str) -> Result<(ReadingBatch, usize), PipelineError> {
    let incoming: IncomingBatch = serde_json::from_str(line)
        .map_err(|e| PipelineError::Source(format!("failed to parse batch json line: {e}")))?;

    let device_id = incoming.device_id;
    if let Some(declared) = incoming.reading_count {
        if declared != incoming.readings.len() {
            tracing::debug!(
                device_id,
                declared,
                actual = incoming.readings.len(),
                "reading_count does not match payload"
            );
        }
    }

    let total = incoming.readings.len();
    let readings: Vec<Reading> = incoming
        .readings
        .into_iter()
        .filter_map(|v| serde_json::from_value::<IncomingReading>(v).ok())
        .filter_map(|r| r.into_reading(device_id))
        .collect();
    let skipped = total - readings.len();

    Ok((ReadingBatch { device_id, readings }, skipped))
}

#[async_trait::async_trait]
impl Source<ReadingBatch> for ReadingBatchFileSource {
    async fn stream(&self) -> EnvelopeStream<ReadingBatch> {
        let path = self.path.clone();
        let s = stream! {
            match File::open(&path).await {
                Ok(file) => {
                    let mut lines = BufReader::new(file).lines();
                    loop {
                        let line = match lines.next_line().await {
                            Ok(Some(line)) => line,
                            Ok(None) => break,
                            Err(e) => {
                                yield Err(PipelineError::Source(format!("failed to read batch line: {e}")));
                                break;
                            }
                        };
                        if line.trim().is_empty() {
                            continue;
                        }

                        match parse_line(&line) {
                            Ok((batch, skipped)) => {
                                if skipped > 0 {
                                    metrics::counter!("readings_skipped_total").increment(skipped as u64);
                                    tracing::warn!(
                                        device_id = batch.device_id,
                                        skipped,
                                        "skipped malformed readings"
                                    );
                                }
                                yield Ok(Envelope::new(batch));
                            }
                            Err(e) => {
                                metrics::counter!("reading_batch_parse_errors_total").increment(1);
                                yield Err(e);
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open batch file {}: {e}",
                        path.display()
                    )));
                }
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
    fn parses_a_device_upload() {
        let line = r#"{"device_id": 1, "reading_count": 2, "readings": [
            {"voltage": 230.5, "current": 2.45, "timestamp": 1698345600},
            {"voltage": 231.0, "current": 2.5, "timestamp": 1698345610}
        ]}"#;
        let (batch, skipped) = parse_line(line).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(batch.device_id, 1);
        assert_eq!(batch.readings.len(), 2);
        assert_eq!(batch.readings[0].ts, datetime!(2023-10-26 18:40:00 UTC));
        assert_eq!(batch.readings[0].voltage, 230.5);
        assert_eq!(batch.readings[1].current, 2.5);
    }

    #[test]
    fn fractional_and_float_timestamps_are_accepted() {
        let line = r#"{"device_id": 3, "readings": [
            {"voltage": 230.0, "current": 1.0, "timestamp": 1698345600.0},
            {"voltage": 230.0, "current": 1.0, "timestamp": 1698345600.5}
        ]}"#;
        let (batch, skipped) = parse_line(line).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(batch.readings[0].ts, datetime!(2023-10-26 18:40:00 UTC));
        assert_eq!(batch.readings[1].ts, datetime!(2023-10-26 18:40:00.5 UTC));
    }

    #[test]
    fn incomplete_readings_are_skipped() {
        let line = r#"{"device_id": 7, "readings": [
            {"voltage": 230.0, "current": 1.0, "timestamp": 1698345600},
            {"current": 1.0, "timestamp": 1698345610},
            {"voltage": 230.0, "timestamp": 1698345620},
            {"voltage": 230.0, "current": 1.0},
            {"voltage": "high", "current": 1.0, "timestamp": 1698345630}
        ]}"#;
        let (batch, skipped) = parse_line(line).unwrap();
        assert_eq!(skipped, 4);
        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.readings[0].device_id, 7);
    }

    #[test]
    fn line_without_device_id_is_an_error() {
        let res = parse_line(r#"{"readings": []}"#);
        assert!(matches!(res, Err(PipelineError::Source(_))));
    }

    #[tokio::test]
    async fn bad_lines_do_not_end_the_stream() {
        let path = std::env::temp_dir().join(format!("reading-batches-{}.ndjson", std::process::id()));
        let contents = concat!(
            r#"{"device_id": 1, "readings": [{"voltage": 230.0, "current": 1.0, "timestamp": 1698345600}]}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"device_id": 2, "readings": []}"#,
            "\n",
        );
        tokio::fs::write(&path, contents).await.unwrap();

        let items: Vec<_> = ReadingBatchFileSource::new(&path).stream().await.collect().await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().payload.device_id, 1);
        assert!(items[1].is_err());
        assert!(items[2].as_ref().unwrap().payload.readings.is_empty());
    }
}

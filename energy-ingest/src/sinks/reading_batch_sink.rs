use std::{collections::BTreeSet, sync::Arc, time::Duration};

use energy_client::{
    domain::{LogType, Reading, ReadingBatch, SystemLogEntry},
    store::{ReadingStore, SystemLogStore},
    AnalyticsError, Services,
};
use futures::StreamExt;
use serde_json::json;
use time::{Date, OffsetDateTime};

use crate::pipeline::{Envelope, IngestSummary, PipelineError, Sink};

/// Stores device batches and drives the analytics for each one.
///
/// Per batch: spike detection against the stored history, bulk insert of the
/// readings (chunked, with retry), a `data_received` log entry, then a
/// recompute of the energy record of every date the batch touched.
pub struct ReadingBatchSink {
    services: Services,
    readings: Arc<dyn ReadingStore>,
    logs: Arc<dyn SystemLogStore>,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    stored: u64,
    spikes: usize,
    energy_records: usize,
}

impl ReadingBatchSink {
    pub fn new(
        services: Services,
        readings: Arc<dyn ReadingStore>,
        logs: Arc<dyn SystemLogStore>,
        batch_size: usize,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            services,
            readings,
            logs,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    async fn process(&self, env: &Envelope<ReadingBatch>) -> Result<BatchOutcome, AnalyticsError> {
        let batch = &env.payload;
        let device_id = batch.device_id;
        if batch.readings.is_empty() {
            tracing::debug!(device_id, "empty batch, nothing to store");
            return Ok(BatchOutcome::default());
        }

        // Runs before the insert so the baseline excludes this batch.
        let spikes = self.services.spikes.detect_spikes(device_id, &batch.readings).await?;

        let mut stored = 0;
        for chunk in batch.readings.chunks(self.batch_size) {
            stored += self.flush_chunk(chunk).await?;
        }

        let received = batch.readings.len();
        self.logs
            .append_logs(&[SystemLogEntry {
                log_type: LogType::DataReceived,
                device_id,
                message: format!("Received {received} sensor readings"),
                metadata: json!({ "readings_count": received }),
                ts: OffsetDateTime::now_utc(),
            }])
            .await?;

        let dates: BTreeSet<Date> = batch.readings.iter().map(Reading::date).collect();
        let mut energy_records = 0;
        for date in dates {
            if self
                .services
                .aggregator
                .recompute_daily(device_id, date)
                .await?
                .is_some()
            {
                energy_records += 1;
            }
        }

        Ok(BatchOutcome {
            stored,
            spikes: spikes.len(),
            energy_records,
        })
    }

    async fn flush_chunk(&self, chunk: &[Reading]) -> Result<u64, AnalyticsError> {
        let mut attempt: u32 = 0;
        loop {
            match self.readings.insert_readings(chunk).await {
                Ok(inserted) => return Ok(inserted),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        rows = chunk.len(),
                        "reading insert failed, retrying with backoff"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, rows = chunk.len(), "reading insert failed, giving up");
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink<ReadingBatch> for ReadingBatchSink {
    async fn run<S>(&self, mut input: S) -> Result<IngestSummary, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<ReadingBatch>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut summary = IngestSummary::default();

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for ReadingBatchSink");
                    continue;
                }
            };
            summary.batches += 1;

            match self.process(&env).await {
                Ok(outcome) => {
                    summary.readings_stored += outcome.stored;
                    summary.spikes += outcome.spikes;
                    summary.energy_records += outcome.energy_records;

                    metrics::counter!("readings_ingested_total").increment(outcome.stored);
                    metrics::counter!("power_spikes_detected_total").increment(outcome.spikes as u64);
                    metrics::counter!("energy_records_upserted_total")
                        .increment(outcome.energy_records as u64);
                    if let Ok(dur) = std::time::SystemTime::now().duration_since(env.received_at) {
                        metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
                    }
                }
                Err(AnalyticsError::DeviceNotFound(device_id)) => {
                    tracing::warn!(device_id, "batch for unknown device, skipping");
                    metrics::counter!("reading_batches_failed_total").increment(1);
                    summary.batches_failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, device_id = env.payload.device_id, "batch processing failed");
                    metrics::counter!("reading_batches_failed_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }

        Ok(summary)
    }
}
